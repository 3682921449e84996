use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::template::render::DEFAULT_MAX_LAYOUT_DEPTH;

/// Files looked for in the repository root, first hit wins.
pub const CONFIG_FILES: &[&str] = &["roughprompt.toml", ".roughprompt.toml"];

pub const ENV_PREFIX: &str = "ROUGHPROMPT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Ignore globs applied on top of .gitignore
    pub ignore_patterns: Vec<String>,

    /// Extra template directories, searched after the repository root
    pub template_dirs: Vec<PathBuf>,

    /// Model or encoding for token counts; "approx" skips the tokenizer
    pub model: String,

    /// Template variant tried first (e.g. "review" picks `x.review.md`)
    pub mode: Option<String>,

    /// Repository notes exposed to templates as `Notes`
    pub notes_file: Option<PathBuf>,

    /// Layout/partial nesting limit
    pub max_layout_depth: usize,

    /// Default output file; stdout when unset
    pub output: Option<PathBuf>,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            ignore_patterns: vec![
                "**/dist".to_string(),
                "**/build".to_string(),
                "*.pyc".to_string(),
                "**/__pycache__".to_string(),
                "**/.DS_Store".to_string(),
                "*.lock".to_string(),
            ],
            template_dirs: Vec::new(),
            model: "gpt-4o".to_string(),
            mode: None,
            notes_file: Some(PathBuf::from(".roughprompt/notes.md")),
            max_layout_depth: DEFAULT_MAX_LAYOUT_DEPTH,
            output: None,
        }
    }
}

/// Load `roughprompt.toml` from `root` plus `ROUGHPROMPT_*` overrides.
pub fn load_config(root: &Path) -> Result<Config>
{
    load_with_env(root, None)
}

/// `env` replaces the process environment when given.
pub fn load_with_env(
    root: &Path,
    env: Option<config::Map<String, String>>,
) -> Result<Config>
{
    let mut builder = config::Config::builder();

    for name in CONFIG_FILES
    {
        let path = root.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // ROUGHPROMPT_MAX_LAYOUT_DEPTH=4, ROUGHPROMPT_TEMPLATE_DIRS=a,b
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("ignore_patterns")
            .with_list_parse_key("template_dirs")
            .source(env),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!("Config file already exists at {}. Use --force to overwrite.", config_path.display());
    }

    let toml_string = toml::to_string_pretty(&Config::default()).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        eprintln!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn defaults_without_files() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let cfg = load_with_env(tmp.path(), Some(config::Map::new()))?;
        assert_eq!(cfg, Config::default());
        Ok(())
    }

    #[test]
    fn file_values_and_env_overrides() -> Result<()>
    {
        let tmp = TempDir::new()?;
        std::fs::write(
            tmp.path()
                .join(".roughprompt.toml"),
            "model = \"approx\"\nmode = \"review\"\ntemplate_dirs = [\"prompts\"]\n",
        )?;

        let mut env = config::Map::new();
        env.insert("ROUGHPROMPT_MAX_LAYOUT_DEPTH".to_string(), "4".to_string());
        env.insert("ROUGHPROMPT_IGNORE_PATTERNS".to_string(), "vendor/**,*.snap".to_string());

        let cfg = load_with_env(tmp.path(), Some(env))?;
        assert_eq!(cfg.model, "approx");
        assert_eq!(cfg.mode.as_deref(), Some("review"));
        assert_eq!(cfg.template_dirs, vec![PathBuf::from("prompts")]);
        assert_eq!(cfg.max_layout_depth, 4);
        assert_eq!(cfg.ignore_patterns, vec!["vendor/**", "*.snap"]);
        Ok(())
    }

    #[test]
    fn init_writes_loadable_defaults() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let ctx = AppContext { quiet: true, no_color: true, verbose: false };
        let args = InitArgs { path: tmp.path().to_path_buf(), force: false };
        init(args, &ctx)?;

        let cfg = load_with_env(tmp.path(), Some(config::Map::new()))?;
        assert_eq!(cfg, Config::default());

        let again = InitArgs { path: tmp.path().to_path_buf(), force: false };
        assert!(init(again, &ctx).is_err());
        Ok(())
    }
}
