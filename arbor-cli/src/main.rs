//! Thin binary wiring `arbor-repo`/`arbor-branch`/`arbor-log` together
//! for manual smoke-testing. CLI ergonomics (argument shapes, output
//! formatting beyond what `arbor-log`'s formatters already produce) are
//! explicitly out of scope for the engine itself; this exists only so a
//! person at a terminal can exercise the wiring end to end, the role
//! `apiserver/client/src/main.rs` plays for its own Thrift client.

use std::process;

use clap::{App, Arg, ArgMatches, SubCommand};

use arbor_branch::{Branch, ControlDir};
use arbor_errors::Result;
use arbor_log::{generate_log, LineFormatter, LogFormatter, LogRequest, LongFormatter, ShortFormatter};
use arbor_model::{EntryKind, FileId, Inventory, InventoryEntry, Revision, RevisionId};
use arbor_repo::{Knit1Format, Repository, RichRootFormat};
use arbor_transport::LocalTransport;

fn main() {
    tracing_subscriber::fmt::init();

    let matches = App::new("arbor")
        .about("Revision graph and storage engine — smoke-test CLI")
        .subcommand(
            SubCommand::with_name("init")
                .about("creates an empty control dir and branch at PATH")
                .arg(Arg::with_name("path").required(true))
                .arg(Arg::with_name("rich-root").long("rich-root")),
        )
        .subcommand(
            SubCommand::with_name("demo")
                .about("initializes a control dir at PATH and commits a handful of synthetic revisions")
                .arg(Arg::with_name("path").required(true))
                .arg(
                    Arg::with_name("commits")
                        .long("commits")
                        .value_name("N")
                        .default_value("3"),
                )
                .arg(
                    Arg::with_name("style")
                        .long("style")
                        .value_name("long|short|line")
                        .default_value("long"),
                ),
        )
        .subcommand(
            SubCommand::with_name("fetch-demo")
                .about("fetches an ephemeral synthetic source history into a persisted branch at PATH")
                .arg(Arg::with_name("path").required(true))
                .arg(
                    Arg::with_name("commits")
                        .long("commits")
                        .value_name("N")
                        .default_value("3"),
                ),
        )
        .get_matches();

    let result = if let Some(m) = matches.subcommand_matches("init") {
        run_init(m)
    } else if let Some(m) = matches.subcommand_matches("demo") {
        run_demo(m)
    } else if let Some(m) = matches.subcommand_matches("fetch-demo") {
        run_fetch_demo(m)
    } else {
        eprintln!("{}", matches.usage());
        process::exit(2);
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run_init(matches: &ArgMatches) -> Result<()> {
    let path = matches.value_of("path").expect("path is required");
    std::fs::create_dir_all(path).map_err(arbor_errors::Error::Io)?;
    let format: Box<dyn arbor_repo::Format> = if matches.is_present("rich-root") {
        Box::new(RichRootFormat)
    } else {
        Box::new(Knit1Format)
    };
    let control_dir = ControlDir::initialize(Box::new(LocalTransport::new(path)), format)?;
    control_dir.create_branch()?;
    println!("initialized an empty branch at {path}");
    Ok(())
}

fn run_demo(matches: &ArgMatches) -> Result<()> {
    let path = matches.value_of("path").expect("path is required");
    let count: usize = matches
        .value_of("commits")
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    std::fs::create_dir_all(path).map_err(arbor_errors::Error::Io)?;
    let control_dir = ControlDir::initialize(Box::new(LocalTransport::new(path)), Box::new(Knit1Format))?;
    let mut branch = control_dir.create_branch()?;
    let mut repo = control_dir.create_repository();

    commit_synthetic_history(&mut repo, &mut branch, count)?;
    print_log(&repo, &branch, matches.value_of("style").unwrap_or("long"))
}

fn run_fetch_demo(matches: &ArgMatches) -> Result<()> {
    let path = matches.value_of("path").expect("path is required");
    let count: usize = matches
        .value_of("commits")
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    let mut source_repo = Repository::new(Box::new(Knit1Format));
    let source_transport_dir = tempfile::tempdir().map_err(arbor_errors::Error::Io)?;
    let mut source_branch =
        Branch::create(Box::new(LocalTransport::new(source_transport_dir.path())))?;
    commit_synthetic_history(&mut source_repo, &mut source_branch, count)?;

    std::fs::create_dir_all(path).map_err(arbor_errors::Error::Io)?;
    let control_dir = ControlDir::initialize(Box::new(LocalTransport::new(path)), Box::new(Knit1Format))?;
    let mut target_branch = control_dir.create_branch()?;
    let mut target_repo = control_dir.create_repository();

    target_branch.pull(&source_branch, &mut target_repo, &source_repo, true)?;
    println!(
        "pulled {} revisions into {path}",
        target_branch.revision_history().len()
    );
    print_log(&target_repo, &target_branch, "long")
}

/// Commits `count` trivial single-file revisions chained onto whatever
/// `branch` already holds, appending each to both `repo` and `branch`.
fn commit_synthetic_history(repo: &mut Repository, branch: &mut Branch, count: usize) -> Result<()> {
    let root = FileId::new("root").expect("constant is a valid file id");
    let mut parent = branch.revision_history().last().cloned();

    for i in 0..count {
        let n = branch.revision_history().len() + i + 1;
        let revision_id = RevisionId::new(format!("demo-r{n}")).expect("generated id is valid");
        let text = format!("line {n}\n").repeat(n);

        let mut inventory = match &parent {
            Some(p) if repo.has_revision(p) => repo.get_inventory(p)?,
            _ => Inventory::empty_tree(root.clone()),
        };
        let sha1 = sha1_hex(text.as_bytes());
        inventory.add(InventoryEntry {
            file_id: FileId::new("f1").expect("constant is a valid file id"),
            kind: EntryKind::File,
            name: "f1.txt".to_string(),
            parent_id: Some(root.clone()),
            revision: revision_id.clone(),
            text_sha1: Some(sha1),
            text_size: Some(text.len() as u64),
            symlink_target: None,
        })?;

        let canonical = inventory.to_canonical_bytes();
        let mut revision = Revision::new(revision_id.clone(), sha1_hex(&canonical));
        revision.committer = "smoke-test".to_string();
        revision.message = format!("synthetic commit {n}");
        revision.parent_ids = parent.clone().into_iter().collect();

        repo.add_revision(revision, inventory, vec![(FileId::new("f1").unwrap(), text.into_bytes())])?;
        branch.append_revision(revision_id.clone())?;
        parent = Some(revision_id);
    }
    Ok(())
}

fn print_log(repo: &Repository, branch: &Branch, style: &str) -> Result<()> {
    let entries = generate_log(repo, branch, &LogRequest::default())?;
    for entry in &entries {
        let text = match style {
            "short" => ShortFormatter.format(entry),
            "line" => LineFormatter.format(entry),
            _ => LongFormatter.format(entry),
        };
        print!("{text}");
    }
    Ok(())
}

fn sha1_hex(bytes: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
