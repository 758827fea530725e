use std::fmt::Write as _;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tagtree_gate::{Actor, UserId};
use tagtree_service::{Slice, TagsConfig, TagsService, VerificationReport};
use tagtree_store::Fixture;
use tagtree_types::{ContentRef, Tag, TagCreateStruct, TagId, TagUpdateStruct};
use tracing::info;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    if cli.write && cli.fixture.is_none() {
        bail!("--write needs --fixture");
    }
    let config = match &cli.config {
        Some(path) => TagsConfig::from_path(path)?,
        None => TagsConfig::default(),
    };
    let fixture = match &cli.fixture {
        Some(path) => Fixture::from_path(path)
            .with_context(|| format!("loading fixture {}", path.display()))?,
        None => Fixture::sample()?,
    };
    let service = TagsService::in_memory(fixture, config)?;
    let actor = cli
        .roles
        .iter()
        .fold(Actor::new(UserId(cli.user)), |actor, role| actor.with_role(role.as_str()));

    let mutation = cli.command.is_mutation();
    let output = execute(&service, &actor, cli.command, cli.format)?;
    print!("{output}");

    if let (true, true, Some(path)) = (mutation, cli.write, &cli.fixture) {
        service.snapshot()?.write_to_path(path)?;
        info!(path = %path.display(), "saved fixture");
    }
    Ok(())
}

/// Run one command and render its output.
pub fn execute(
    service: &TagsService,
    actor: &Actor,
    command: Command,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let out = Output { format };
    match command {
        Command::Show(args) => {
            let tag = match (args.id, args.remote_id) {
                (Some(id), _) => service.load_tag(actor, id)?,
                (None, Some(remote_id)) => service.load_tag_by_remote_id(actor, &remote_id)?,
                (None, None) => bail!("either an id or --remote-id is required"),
            };
            out.render(&tag, || show_tag(&tag))
        }
        Command::Tree(args) => {
            let tags = collect_tree(service, actor, args.id)?;
            out.render(&tags, || draw_tree(&tags))
        }
        Command::Children(args) => {
            if args.count {
                return out.count(service.get_tag_children_count(actor, args.id)?);
            }
            let tags = service.load_tag_children_slice(actor, args.id, slice(&args))?;
            out.render(&tags, || tag_lines(&tags))
        }
        Command::Synonyms(args) => {
            if args.count {
                return out.count(service.get_tag_synonym_count(actor, args.id)?);
            }
            let tags = service.load_tag_synonyms_slice(actor, args.id, slice(&args))?;
            out.render(&tags, || tag_lines(&tags))
        }
        Command::Content(args) => {
            if args.count {
                return out.count(service.get_related_content_count(actor, args.id)?);
            }
            let content = service.get_related_content_slice(actor, args.id, slice(&args))?;
            out.render(&content, || content_lines(&content))
        }
        Command::Find(args) => {
            let tags = service.load_tags_by_keyword(actor, &args.keyword)?;
            out.render(&tags, || tag_lines(&tags))
        }
        Command::Create(args) => {
            let mut create = TagCreateStruct::new(args.parent, args.keyword);
            create.remote_id = args.remote_id;
            let tag = service.create_tag(actor, create)?;
            out.render(&tag, || done("Created", &tag))
        }
        Command::Update(args) => {
            let update = TagUpdateStruct {
                keyword: args.keyword,
                remote_id: args.remote_id,
            };
            let tag = service.update_tag(actor, args.id, update)?;
            out.render(&tag, || done("Updated", &tag))
        }
        Command::AddSynonym(args) => {
            let tag = service.add_synonym(actor, args.main, args.keyword)?;
            out.render(&tag, || done("Added synonym", &tag))
        }
        Command::Convert(args) => {
            let tag = service.convert_to_synonym(actor, args.id, args.main)?;
            out.render(&tag, || done("Converted", &tag))
        }
        Command::Merge(args) => {
            service.merge_tags(actor, args.id, args.target)?;
            let target = service.load_tag(actor, args.target)?;
            out.render(&target, || {
                format!(
                    "{} Merged tag {} into {}\n",
                    "✓".green().bold(),
                    args.id.to_string().yellow(),
                    line(&target)
                )
            })
        }
        Command::Copy(args) => {
            let tag = service.copy_subtree(actor, args.id, args.to)?;
            out.render(&tag, || done("Copied to", &tag))
        }
        Command::Move(args) => {
            let tag = service.move_subtree(actor, args.id, args.to)?;
            out.render(&tag, || done("Moved to", &tag))
        }
        Command::Delete(args) => {
            service.delete_tag(actor, args.id)?;
            out.render(&serde_json::json!({ "deleted": args.id }), || {
                format!("{} Deleted tag {}\n", "✓".green().bold(), args.id.to_string().yellow())
            })
        }
        Command::Check => {
            let report = service.verify(actor)?;
            let rendered = out.render(&report, || check_report(&report))?;
            if !report.is_valid() {
                print!("{rendered}");
                bail!("{} violation(s) found", report.violations.len());
            }
            Ok(rendered)
        }
    }
}

struct Output {
    format: OutputFormat,
}

impl Output {
    fn render<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<String> {
        match self.format {
            OutputFormat::Text => Ok(text()),
            OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(value)?)),
        }
    }

    fn count(&self, count: usize) -> anyhow::Result<String> {
        self.render(&serde_json::json!({ "count": count }), || format!("{count}\n"))
    }
}

fn slice(args: &ListArgs) -> Slice {
    Slice {
        offset: args.offset,
        limit: args.limit,
    }
}

/// Tags of the forest (or of the subtree below `root`) in display order,
/// each synonym right after its main tag.
fn collect_tree(
    service: &TagsService,
    actor: &Actor,
    root: Option<TagId>,
) -> anyhow::Result<Vec<Tag>> {
    let mut stack: Vec<Tag> = match root {
        Some(id) => vec![service.load_tag(actor, id)?],
        None => service.load_root_tags(actor)?,
    };
    stack.reverse();

    let mut tags = Vec::new();
    while let Some(tag) = stack.pop() {
        if tag.is_synonym() {
            tags.push(tag);
            continue;
        }
        let mut below = service.load_tag_synonyms(actor, tag.id)?;
        below.extend(service.load_tag_children(actor, tag.id)?);
        stack.extend(below.into_iter().rev());
        tags.push(tag);
    }
    Ok(tags)
}

fn draw_tree(tags: &[Tag]) -> String {
    let base = tags.first().map_or(1, |t| t.depth);
    let mut out = String::new();
    for tag in tags {
        let indent = "  ".repeat(tag.depth.saturating_sub(base) as usize);
        if tag.is_synonym() {
            let _ = writeln!(out, "{indent}  = {} {}", tag.keyword.italic(), tag.id.to_string().dimmed());
        } else {
            let _ = writeln!(out, "{indent}{} {}", tag.keyword.bold(), tag.id.to_string().yellow());
        }
    }
    if out.is_empty() {
        out.push_str("No tags.\n");
    }
    out
}

fn line(tag: &Tag) -> String {
    let mut line = format!(
        "{} {} {}",
        tag.id.to_string().yellow(),
        tag.keyword.bold(),
        tag.path_string.to_string().dimmed()
    );
    if let Some(main) = tag.main_tag_id {
        let _ = write!(line, " (synonym of {})", main.to_string().cyan());
    }
    line
}

fn tag_lines(tags: &[Tag]) -> String {
    if tags.is_empty() {
        return "No tags.\n".to_string();
    }
    tags.iter().map(|t| format!("{}\n", line(t))).collect()
}

fn content_lines(content: &[ContentRef]) -> String {
    if content.is_empty() {
        return "No content.\n".to_string();
    }
    content
        .iter()
        .map(|c| format!("{} {}\n", c.id.to_string().yellow(), c.name))
        .collect()
}

fn done(verb: &str, tag: &Tag) -> String {
    format!("{} {verb} {}\n", "✓".green().bold(), line(tag))
}

fn show_tag(tag: &Tag) -> String {
    let mut out = format!("Tag {} {}\n", tag.id.to_string().yellow().bold(), tag.keyword.bold());
    let _ = writeln!(out, "  Path:      {}", tag.path_string);
    let _ = writeln!(out, "  Depth:     {}", tag.depth);
    let parent = tag.parent_tag_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    let _ = writeln!(out, "  Parent:    {parent}");
    if let Some(main) = tag.main_tag_id {
        let _ = writeln!(out, "  Synonym of {}", main.to_string().cyan());
    }
    let _ = writeln!(out, "  Remote id: {}", tag.remote_id);
    let modified = tag
        .modification_date
        .to_datetime()
        .map_or_else(|| tag.modification_date.to_string(), |d| d.to_rfc3339());
    let _ = writeln!(out, "  Modified:  {modified}");
    out
}

fn check_report(report: &VerificationReport) -> String {
    if report.is_valid() {
        return format!(
            "{} {} tags, {} synonyms, no violations\n",
            "✓".green().bold(),
            report.tag_count,
            report.synonym_count
        );
    }
    let mut out = format!("{} {} violation(s)\n", "✗".red().bold(), report.violations.len());
    for violation in &report.violations {
        let _ = writeln!(
            out,
            "  tag {}: {}: {}",
            violation.tag.to_string().yellow(),
            violation.kind.to_string().red(),
            violation.description
        );
    }
    out
}
