//! `cnsh init`: create a `package.json`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use cnsh_core::{manifest::default_package_name, PackageManifest};
use console::style;
use dialoguer::Input;

/// Source of answers for the interactive questionnaire.
pub trait Prompt {
    fn ask(&mut self, question: &str, default: &str) -> Result<String>;
}

/// Prompts on the terminal.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&mut self, question: &str, default: &str) -> Result<String> {
        let answer: String = Input::new()
            .with_prompt(question)
            .default(default.to_string())
            .allow_empty(true)
            .interact_text()
            .with_context(|| format!("reading answer for '{question}'"))?;
        Ok(answer)
    }
}

/// Run `cnsh init [-y]` in the working directory.
pub fn run(cwd: &Path, yes: bool) -> Result<()> {
    if yes {
        create_manifest(cwd, None)
    } else {
        create_manifest(cwd, Some(&mut TerminalPrompt))
    }
}

pub(crate) fn create_manifest(project_dir: &Path, prompt: Option<&mut dyn Prompt>) -> Result<()> {
    let path = PackageManifest::path_in(project_dir);
    if path.exists() {
        bail!("{} already exists", path.display());
    }

    let mut manifest = PackageManifest::with_defaults(&default_package_name(project_dir));
    if let Some(prompt) = prompt {
        fill_from_prompt(&mut manifest, prompt)?;
    }
    cnsh_core::validate_package_name(&manifest.name)?;

    let written = manifest.save(project_dir)?;
    tracing::debug!(path = %written.display(), "Wrote manifest");
    println!("{} Created {}", style("✔").green(), written.display());
    Ok(())
}

fn fill_from_prompt(manifest: &mut PackageManifest, prompt: &mut dyn Prompt) -> Result<()> {
    manifest.name = prompt.ask("package name", &manifest.name)?.trim().to_string();

    let version = prompt.ask("version", &manifest.version)?;
    semver::Version::parse(version.trim())
        .with_context(|| format!("'{}' is not a valid version", version.trim()))?;
    manifest.version = version.trim().to_string();

    manifest.description = prompt.ask("description", "")?;

    let main = prompt.ask("entry point", manifest.main.as_deref().unwrap_or("index.js"))?;
    manifest.main = Some(main);

    let author = prompt.ask("author", "")?;
    manifest.author = Some(serde_json::Value::String(author));

    let license = prompt.ask("license", manifest.license.as_deref().unwrap_or("ISC"))?;
    manifest.license = Some(license);
    Ok(())
}
