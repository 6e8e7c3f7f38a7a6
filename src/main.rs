use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use diffset::diff::{unified, DiffParser, FilePath, PolicyRegistry, Utf8String};
use diffset::error::is_empty_diff;
use diffset::{analyze, patch, Profile, Settings};
use dotenv::dotenv;

fn path_arg(name: &'static str, help: &'static str) -> Arg {
  Arg::new(name)
    .help(help)
    .required(true)
    .value_parser(clap::value_parser!(PathBuf))
}

fn cli() -> Command {
  Command::new("git-diffset")
    .version(crate_version!())
    .about("Parse, diff and patch unified and context diffs")
    .subcommand_required(true)
    .arg_required_else_help(true)
    .subcommand(
      Command::new("parse")
        .about("Parses a diff and prints its files as JSON")
        .arg(path_arg("diff", "Diff file to parse"))
        .arg(Arg::new("backend").long("backend").help("Parser policy (git, svn, hg, generic)"))
        .arg(Arg::new("base-dir").long("base-dir").help("Prefix for relative file names"))
    )
    .subcommand(
      Command::new("diff")
        .about("Prints a unified diff of two files")
        .arg(path_arg("old", "Original file"))
        .arg(path_arg("new", "Modified file"))
        .arg(
          Arg::new("context")
            .short('U')
            .long("context")
            .help("Lines of context")
            .value_parser(clap::value_parser!(usize))
        )
    )
    .subcommand(
      Command::new("opcodes")
        .about("Prints annotated opcodes for two files as JSON")
        .arg(path_arg("old", "Original file"))
        .arg(path_arg("new", "Modified file"))
        .arg(
          Arg::new("ignore-space")
            .long("ignore-space")
            .help("Ignore whitespace when comparing lines")
            .action(ArgAction::SetTrue)
        )
    )
    .subcommand(
      Command::new("patch")
        .about("Applies a diff to a file")
        .arg(path_arg("diff", "Diff to apply"))
        .arg(path_arg("original", "File to patch"))
        .arg(Arg::new("file").long("file").help("Name of the file inside the diff"))
        .arg(
          Arg::new("output")
            .short('o')
            .long("output")
            .help("Write the result here instead of stdout")
            .value_parser(clap::value_parser!(PathBuf))
        )
    )
    .subcommand(Command::new("config").about("Prints the effective settings as JSON"))
}

fn path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
  args
    .get_one::<PathBuf>(name)
    .with_context(|| format!("Missing argument {name}"))
}

fn run_parse(args: &ArgMatches, settings: &Settings) -> Result<()> {
  let registry = PolicyRegistry::with_defaults();
  let backend = args
    .get_one::<String>("backend")
    .unwrap_or(&settings.backend);
  let mut parser = DiffParser::for_backend(&registry, backend)?;
  if let Some(base_dir) = args.get_one::<String>("base-dir") {
    parser = parser.with_base_dir(base_dir.as_str());
  }

  let data = path(args, "diff")?.read_bytes()?;
  let files = parser.parse(&data)?;

  let summary: Vec<_> = files
    .iter()
    .map(|file| {
      serde_json::json!({
        "orig_file": file.orig_file,
        "new_file": file.new_file,
        "orig_revision": file.orig_revision,
        "new_revision": file.new_revision,
        "status": file.status,
        "binary": file.binary,
        "insert_count": file.insert_count,
        "delete_count": file.delete_count,
        "hunks": file.hunks.len(),
        "extra": file.extra
      })
    })
    .collect();
  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(())
}

fn run_diff(args: &ArgMatches, settings: &Settings) -> Result<()> {
  let old_path = path(args, "old")?;
  let new_path = path(args, "new")?;
  let old = old_path.read_bytes()?.to_utf8();
  let new = new_path.read_bytes()?.to_utf8();
  let context = args
    .get_one::<usize>("context")
    .copied()
    .unwrap_or(settings.context_lines);

  print!(
    "{}",
    unified::render(&old_path.to_string_lossy(), &new_path.to_string_lossy(), &old, &new, context)
  );
  Ok(())
}

fn run_opcodes(args: &ArgMatches, settings: &Settings) -> Result<()> {
  let new_path = path(args, "new")?;
  let old = path(args, "old")?.read_bytes()?.to_utf8();
  let new = new_path.read_bytes()?.to_utf8();
  let a: Vec<&str> = old.lines().collect();
  let b: Vec<&str> = new.lines().collect();

  let mut settings = settings.clone();
  settings.ignore_space |= args.get_flag("ignore-space");

  let analysis = analyze(&a, &b, &new_path.to_string_lossy(), &settings);
  println!("{}", serde_json::to_string_pretty(&analysis)?);
  Ok(())
}

fn run_patch(args: &ArgMatches) -> Result<()> {
  let original_path = path(args, "original")?;
  let diff = path(args, "diff")?.read_bytes()?;
  let original = original_path.read_bytes()?;
  let name = args
    .get_one::<String>("file")
    .cloned()
    .unwrap_or_else(|| original_path.to_string_lossy().into_owned());

  let patched = patch(&diff, &original, &name).with_context(|| format!("Failed to patch {name}"))?;

  match args.get_one::<PathBuf>("output") {
    Some(output) => output.write_bytes(&patched)?,
    None => print!("{}", patched.to_utf8())
  }
  Ok(())
}

fn run(args: &ArgMatches) -> Result<()> {
  let settings = Settings::load()?;
  log::debug!("Loaded settings: {:?}", settings);

  match args.subcommand() {
    Some(("parse", sub)) => run_parse(sub, &settings),
    Some(("diff", sub)) => run_diff(sub, &settings),
    Some(("opcodes", sub)) => run_opcodes(sub, &settings),
    Some(("patch", sub)) => run_patch(sub),
    Some(("config", _)) => {
      println!("{}", serde_json::to_string_pretty(&settings)?);
      Ok(())
    }
    Some((other, _)) => bail!("Unknown command {other}"),
    None => bail!("No command given")
  }
}

fn main() -> Result<()> {
  dotenv().ok();
  env_logger::init();

  let args = cli().get_matches();
  let _profile = Profile::new("git-diffset");

  match run(&args) {
    Err(err) if is_empty_diff(&err) => {
      eprintln!("{} the diff contains no changes", "Error:".red());
      std::process::exit(1);
    }
    result => result
  }
}
