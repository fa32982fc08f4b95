use anyhow::{Context, Result};
use boxstore::runtime::RealRuntime;
use boxstore::{
    AddOptions, ArchSelector, BoxCollection, BsdtarUnpacker, CollectionConfig, ProviderId,
};
use clap::Parser;
use std::path::PathBuf;

/// boxstore - versioned box collection manager
///
/// Install, look up and remove VM boxes stored under a collection root
/// laid out as <root>/<name>/<version>/[<architecture>/]<provider>.
///
/// Examples:
///   boxstore add ./focal.box hashicorp/focal64 1.0.0
///   boxstore find hashicorp/focal64 --provider virtualbox --constraint "~> 1.0"
#[derive(Parser, Debug)]
#[command(author, version = env!("BOXSTORE_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Collection root directory (overrides defaults; also via BOXSTORE_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "BOXSTORE_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Unpack a box archive into the collection
    Add(AddArgs),

    /// List every installed box
    List,

    /// Show the newest installed box matching a version constraint
    Find(FindArgs),

    /// Remove the directory of a box that has no versions left
    Clean(CleanArgs),

    /// Move an unversioned collection to the versioned layout
    Upgrade,
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Path to the box archive
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Box name, e.g. "hashicorp/focal64"
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Box version
    #[arg(value_name = "VERSION")]
    pub version: String,

    /// Expected provider; may be repeated
    #[arg(long = "provider", short = 'p', value_name = "PROVIDER")]
    pub providers: Vec<String>,

    /// Architecture directory to install under ("auto" for the host)
    #[arg(long = "arch", value_name = "ARCH")]
    pub architecture: Option<String>,

    /// Replace an existing box with the same name, version and provider
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Catalogue URL to remember for this box name
    #[arg(long = "metadata-url", value_name = "URL")]
    pub metadata_url: Option<String>,

    /// Program used to unpack archives
    #[arg(
        long = "unpacker",
        env = "BOXSTORE_UNPACKER",
        value_name = "PROGRAM",
        default_value = "bsdtar"
    )]
    pub unpacker: String,
}

#[derive(clap::Args, Debug)]
pub struct FindArgs {
    /// Box name
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Providers to try, in order; may be repeated
    #[arg(long = "provider", short = 'p', value_name = "PROVIDER", required = true)]
    pub providers: Vec<String>,

    /// Version constraint, e.g. ">= 1.0, < 2"
    #[arg(long = "constraint", short = 'c', value_name = "CONSTRAINT", default_value = "")]
    pub constraint: String,

    /// Architecture ("auto" for the host)
    #[arg(long = "arch", value_name = "ARCH", default_value = "auto")]
    pub architecture: String,
}

#[derive(clap::Args, Debug)]
pub struct CleanArgs {
    /// Box name
    #[arg(value_name = "NAME")]
    pub name: String,
}

fn parse_providers(list: &[String]) -> Result<Vec<ProviderId>> {
    list.iter()
        .map(|p| ProviderId::parse(p).context("Invalid --provider"))
        .collect()
}

fn parse_architecture(arch: &str) -> Result<ArchSelector> {
    ArchSelector::parse(arch).context("Invalid --arch")
}

fn open_collection(
    root: Option<PathBuf>,
    unpacker: BsdtarUnpacker,
) -> Result<BoxCollection<RealRuntime, BsdtarUnpacker>> {
    let config = CollectionConfig::resolve(&RealRuntime, root)?;
    Ok(BoxCollection::new(RealRuntime, unpacker, config))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Add(args) => {
            let collection =
                open_collection(cli.root, BsdtarUnpacker::with_program(&args.unpacker))?;
            let options = AddOptions {
                providers: if args.providers.is_empty() {
                    None
                } else {
                    Some(parse_providers(&args.providers)?)
                },
                architecture: args
                    .architecture
                    .as_deref()
                    .map(parse_architecture)
                    .transpose()?,
                force: args.force,
                metadata_url: args.metadata_url,
            };
            let added = collection.add(&args.archive, &args.name, &args.version, &options)?;
            println!(
                "Added box '{}' ({}) version {}",
                added.name, added.provider, added.version
            );
        }
        Commands::List => {
            let collection = open_collection(cli.root, BsdtarUnpacker::new())?;
            let entries = collection.all()?;
            if entries.is_empty() {
                println!("No boxes installed.");
            }
            for entry in entries {
                match entry.architecture {
                    Some(arch) => println!(
                        "{} ({}, {}, {})",
                        entry.name, entry.provider, entry.version, arch
                    ),
                    None => println!("{} ({}, {})", entry.name, entry.provider, entry.version),
                }
            }
        }
        Commands::Find(args) => {
            let collection = open_collection(cli.root, BsdtarUnpacker::new())?;
            let providers = parse_providers(&args.providers)?;
            let selector = parse_architecture(&args.architecture)?;
            match collection.find(&args.name, &providers, &args.constraint, &selector)? {
                Some(found) => {
                    println!(
                        "{} ({}, {}) {}",
                        found.name,
                        found.provider,
                        found.version,
                        found.directory.display()
                    );
                    if let Some(url) = found.metadata_url {
                        println!("metadata_url: {}", url);
                    }
                }
                None => anyhow::bail!("No box named '{}' matches", args.name),
            }
        }
        Commands::Clean(args) => {
            let collection = open_collection(cli.root, BsdtarUnpacker::new())?;
            if collection.clean(&args.name)? {
                println!("Removed box '{}'", args.name);
            } else {
                println!("Box '{}' still has installed versions", args.name);
            }
        }
        Commands::Upgrade => {
            let collection = open_collection(cli.root, BsdtarUnpacker::new())?;
            let count = collection.upgrade_v1_1_to_v1_5()?;
            println!("Upgraded {} box(es)", count);
        }
    }
    Ok(())
}
