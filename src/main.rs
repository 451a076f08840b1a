//! `parcel`: validate, import and export content packages.

mod platform;

use crate::platform::Platform;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use parcel_config::Config;
use parcel_hub::{ContentTypeCache, ReqwestHubClient};
use parcel_model::{LibraryName, User};
use parcel_package::{AllowAll, ImportOptions, PackageExporter, PackageImporter};
use parcel_storage::ContentId;
use parcel_validate::{Category, ValidationErrors};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parcel", version, about = "Validate, import and export content packages")]
struct Cli {
    /// Config file (TOML, YAML or JSON); defaults to the platform config directory.
    #[arg(long, short, global = true, env = "PARCEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a package without importing it.
    Validate { package: PathBuf },
    /// Import a package: install its libraries and store its content.
    Import(ImportArgs),
    /// Export stored content, with every library it needs, as a package.
    Export { content: String, destination: PathBuf },
    /// List installed libraries.
    Libraries {
        /// Also list newer versions offered by the cached hub catalog.
        #[arg(long)]
        upgrades: bool,
    },
    /// Delete a library nothing uses any more, e.g. `H5P.Foo-1.0`.
    DeleteLibrary { library: String },
    /// Content-type hub catalog.
    #[command(subcommand)]
    Hub(HubCommand),
}

#[derive(Args)]
struct ImportArgs {
    package: PathBuf,
    /// Store the content under this id instead of a generated one.
    #[arg(long)]
    id: Option<String>,
    /// Only store the content; leave installed libraries alone.
    #[arg(long, conflicts_with = "no_content")]
    no_libraries: bool,
    /// Only install the libraries.
    #[arg(long)]
    no_content: bool,
}

#[derive(Subcommand)]
enum HubCommand {
    /// Refresh the cached catalog when it is outdated.
    Update {
        /// Refresh even when the cached catalog is recent.
        #[arg(long)]
        force: bool,
    },
    /// Show the cached catalog, optionally only the given machine names.
    List { names: Vec<String> },
}

/// Render an error tree for the terminal.
pub(crate) fn report<E>(err: exn::Exn<E>) -> miette::Report
where
    E: std::error::Error + Send + Sync + 'static,
{
    miette::miette!("{err:?}")
}

fn print_problems(errors: &ValidationErrors) {
    for category in [Category::Malformed, Category::Policy] {
        for problem in errors.of(category) {
            eprintln!("  [{category}] {problem}");
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).map_err(report)?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .into_diagnostic()?;
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.command {
        Command::Validate { package } => validate(&config, &package).await,
        command => {
            let platform = Platform::open(&config).await?;
            let result = run(&config, &platform, command).await;
            platform.close().await;
            result
        },
    }
}

async fn validate(config: &Config, package: &Path) -> miette::Result<()> {
    match parcel_validate::validate(package, &config.validation).await {
        Ok(package) => {
            println!("{}: valid", package.manifest.title);
            for library in &package.libraries {
                println!("  {} {}", library.metadata.name(), library.metadata.version());
            }
            Ok(())
        },
        Err(err) => {
            if let Some(errors) = err.problems() {
                eprintln!("{} problem(s) found:", errors.len());
                print_problems(errors);
            }
            Err(report(err))
        },
    }
}

async fn run(config: &Config, platform: &Platform, command: Command) -> miette::Result<()> {
    let user = User::administrator("cli");
    match command {
        Command::Validate { package } => return validate(config, &package).await,
        Command::Import(args) => {
            let importer =
                PackageImporter::new(platform.libraries.clone(), platform.content.clone(), config.validation.clone());
            let options = ImportOptions { install_libraries: !args.no_libraries, copy_content: !args.no_content };
            let id = args.id.map(|id| id.parse::<ContentId>()).transpose().map_err(report)?;
            let imported = match importer.import(&args.package, &user, options, id).await {
                Ok(imported) => imported,
                Err(err) => {
                    if let Some(errors) = err.problems() {
                        print_problems(errors);
                    }
                    return Err(report(err));
                },
            };
            for (_, install) in &imported.installs.installs {
                let library = install.library();
                let state = if install.changed() { "installed" } else { "already installed" };
                println!("{} {}: {state}", library.name(), library.version());
            }
            for (directory, err) in &imported.installs.failures {
                eprintln!("{}: {}", directory.display(), **err);
            }
            if let Some(id) = imported.content {
                println!("content {id}: {}", imported.manifest.title);
            }
        },
        Command::Export { content, destination } => {
            let id = content.parse::<ContentId>().map_err(report)?;
            let exporter = PackageExporter::new(platform.libraries.clone(), platform.content.clone(), Arc::new(AllowAll));
            let summary = exporter.export(&id, &user, &destination).await.map_err(report)?;
            println!("{}: {} entries, {} libraries", destination.display(), summary.entries, summary.libraries.len());
        },
        Command::Libraries { upgrades } => {
            for (machine_name, versions) in platform.libraries.installed(None).await.map_err(report)? {
                let versions: Vec<_> = versions.iter().map(|library| library.version().to_string()).collect();
                println!("{machine_name} {}", versions.join(", "));
            }
            if upgrades {
                let catalog = hub_cache(config, platform)?.get(None).await.map_err(report)?.unwrap_or_default();
                for upgrade in platform.libraries.upgrades_available(&catalog).await.map_err(report)? {
                    println!("upgrade: {} {} -> {}", upgrade.machine_name, upgrade.installed, upgrade.available);
                }
            }
        },
        Command::DeleteLibrary { library } => {
            let name = library.parse::<LibraryName>().map_err(report)?;
            platform.libraries.delete_library(&name).await.map_err(report)?;
            println!("{name}: deleted");
        },
        Command::Hub(HubCommand::Update { force }) => {
            let cache = hub_cache(config, platform)?;
            let updated = match force {
                true => cache.force_update().await.map(|_| true),
                false => cache.update_if_necessary().await,
            };
            match updated.map_err(report)? {
                true => println!("hub catalog updated"),
                false => println!("hub catalog is up to date"),
            }
        },
        Command::Hub(HubCommand::List { names }) => {
            let names = (!names.is_empty()).then_some(names.as_slice());
            let Some(content_types) = hub_cache(config, platform)?.get(names).await.map_err(report)? else {
                println!("hub catalog was never fetched; run `parcel hub update`");
                return Ok(());
            };
            for content_type in content_types {
                println!("{} {}: {}", content_type.id, content_type.version(), content_type.title);
            }
        },
    }
    Ok(())
}

fn hub_cache(config: &Config, platform: &Platform) -> miette::Result<ContentTypeCache> {
    let client = ReqwestHubClient::new(&config.hub).map_err(report)?;
    Ok(ContentTypeCache::new(config.hub.clone(), Arc::new(client), platform.settings.clone()))
}
