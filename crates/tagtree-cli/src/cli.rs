use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tagtree_types::TagId;

#[derive(Parser)]
#[command(
    name = "tagtree",
    about = "Hierarchical tags with synonyms, moves, copies and merges",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON snapshot to operate on. The bundled sample is used when omitted.
    #[arg(long, global = true)]
    pub fixture: Option<PathBuf>,

    /// TOML file with `[service]` and `[gate]` sections.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Acting user id.
    #[arg(long, global = true, default_value_t = 14)]
    pub user: u64,

    /// Role of the acting user. Repeatable.
    #[arg(long = "role", global = true)]
    pub roles: Vec<String>,

    /// Save the snapshot back to `--fixture` after a successful change.
    #[arg(short, long, global = true)]
    pub write: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show a single tag
    Show(ShowArgs),
    /// Print the forest, or the subtree below one tag
    Tree(TreeArgs),
    /// List the children of a tag
    Children(ListArgs),
    /// List the synonyms of a tag
    Synonyms(ListArgs),
    /// List content tagged with a tag
    Content(ListArgs),
    /// Find tags by exact keyword
    Find(FindArgs),
    /// Create a tag
    Create(CreateArgs),
    /// Change the keyword or remote id of a tag
    Update(UpdateArgs),
    /// Add a synonym to a tag
    AddSynonym(AddSynonymArgs),
    /// Turn a tag into a synonym of another tag
    Convert(ConvertArgs),
    /// Merge a tag into another tag
    Merge(MergeArgs),
    /// Copy a subtree below another tag
    Copy(PlaceArgs),
    /// Move a subtree below another tag
    Move(PlaceArgs),
    /// Delete a tag with its subtree and synonyms
    Delete(DeleteArgs),
    /// Check the forest for broken paths, depths and synonym links
    Check,
}

impl Command {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create(_)
                | Self::Update(_)
                | Self::AddSynonym(_)
                | Self::Convert(_)
                | Self::Merge(_)
                | Self::Copy(_)
                | Self::Move(_)
                | Self::Delete(_)
        )
    }
}

#[derive(Args)]
pub struct ShowArgs {
    #[arg(required_unless_present = "remote_id", conflicts_with = "remote_id")]
    pub id: Option<TagId>,
    #[arg(long)]
    pub remote_id: Option<String>,
}

#[derive(Args)]
pub struct TreeArgs {
    pub id: Option<TagId>,
}

#[derive(Args)]
pub struct ListArgs {
    pub id: TagId,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print only the number of entries
    #[arg(long)]
    pub count: bool,
}

#[derive(Args)]
pub struct FindArgs {
    pub keyword: String,
}

#[derive(Args)]
pub struct CreateArgs {
    pub keyword: String,
    /// Parent tag. A top-level tag is created when omitted.
    #[arg(long)]
    pub parent: Option<TagId>,
    #[arg(long)]
    pub remote_id: Option<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub id: TagId,
    #[arg(long, required_unless_present = "remote_id")]
    pub keyword: Option<String>,
    #[arg(long)]
    pub remote_id: Option<String>,
}

#[derive(Args)]
pub struct AddSynonymArgs {
    pub main: TagId,
    pub keyword: String,
}

#[derive(Args)]
pub struct ConvertArgs {
    pub id: TagId,
    pub main: TagId,
}

#[derive(Args)]
pub struct MergeArgs {
    pub id: TagId,
    pub target: TagId,
}

#[derive(Args)]
pub struct PlaceArgs {
    pub id: TagId,
    /// New parent. The top level when omitted.
    #[arg(long)]
    pub to: Option<TagId>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub id: TagId,
}
