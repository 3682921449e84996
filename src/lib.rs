//! **roughprompt** - assemble LLM prompts from a source tree
//!
//! Layered template resolution, a small file-selection query language, and
//! concurrent token accounting for everything that ends up in the prompt.

/// Command-line interface with clap integration
pub mod cli;

/// Command handlers behind each subcommand
pub mod cli_ext;

/// Shell completion generation
pub mod completion;

/// Core prompt assembly: selection, templates, metrics
pub mod core {
    /// Insertion-ordered set with union/intersection/difference
    pub mod pathset;
    pub use pathset::PathSet;

    /// Validated line ranges, coalescing, and single-pass extraction
    pub mod ranges;
    pub use ranges::LineRange;

    /// File-selection query language (plus the fzf-style dialect)
    pub mod select;
    pub use select::{FileSelection, Matcher, SelectError, select_files};

    /// Layered template resolution, front matter, and layout rendering
    pub mod template;
    pub use template::{Renderer, Resolver, TemplateData};

    /// Background token/byte/line accounting
    pub mod metrics;
    pub use metrics::{MetricKind, MetricsCollector};

    /// User content loaders (stdin, files, literal text, clipboard)
    pub mod content;

    /// Directory tree rendering for prompts and the terminal
    pub mod tree;
    pub use tree::DirTree;

    /// End-to-end render pipeline
    pub mod pipeline;
    pub use pipeline::{Pipeline, PromptOutput, RenderRequest};
}

/// Infrastructure - configuration, I/O, and walking
pub mod infra {
    /// Layered configuration: defaults, TOML file, environment
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped reads for large files, clipboard, and output sinks
    pub mod io;
    pub use io::{FileContent, read_file_smart};

    /// Gitignore-aware repository indexing
    pub mod walk;
    pub use walk::{DirectoryIndex, FileWalker};
}

// Strategic re-exports for clean CLI interface
pub use crate::cli::{AppContext, Cli, Commands};
pub use crate::core::{Matcher, Pipeline, RenderRequest, Renderer, Resolver};
pub use crate::infra::{Config, FileWalker, load_config};
