use clap::{Parser, Subcommand};
use sitepress::config::{self, SiteConfig};
use sitepress::output::{self, BuildProgress};
use sitepress::pipeline::{self, BuildOptions, SiteBuilder};
use sitepress::sync::SyncWatcher;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const NOT_BUILT: &str = "The site has not been built yet. Run `sitepress build` first.";

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn version_string() -> &'static str {
    if env!("SITEPRESS_RELEASE") == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("SITEPRESS_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "sitepress")]
#[command(about = "Template-driven static site builder")]
#[command(long_about = "\
Template-driven static site builder

Every *.html file in the source directory is rendered as a template to the
same path in the output directory. Everything else is copied as-is.

Project structure:

  sitepress.toml               # Site config (optional)
  templates/                   # Layouts and partials, searched first
  │   ├── base.html
  │   ├── attributions.html    # Renders the [[attributions]] page
  │   └── sitemap.xml          # Renders sitemap.xml
  └── src/
      ├── index.html           # {% extends \"base.html\" %}
      ├── css/site.css         # Copied
      ├── attributions/        # Attribution texts (blacklisted by default)
      └── images/favicon/site.webmanifest   # name/short_name patched

Template values: rootUrl, pagePath, cacheVersion, [social_media], [overrides].

Run 'sitepress gen-config' to generate a documented sitepress.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file; relative directories in it resolve against its location
    #[arg(long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clean the output directory and build the site into it
    Build {
        /// Open the built site in the default browser
        #[arg(long)]
        open: bool,
    },
    /// Open the built site in the default browser
    Open,
    /// Copy in-place edits of static files in the output back to the source
    Sync {
        /// Seconds during which repeated changes to one file are ignored
        #[arg(short, long)]
        delay: Option<f64>,
    },
    /// Print a stock sitepress.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Build { open } => {
            let site_config = config::load_config(&cli.config)?;
            let options = BuildOptions::from_config(&site_config)?;
            let builder = SiteBuilder::new(options);
            println!(
                "==> Building {} → {}",
                builder.options().source_dir.display(),
                builder.options().output_dir.display()
            );

            let (tx, rx) = mpsc::channel();
            let output_dir = builder.options().output_dir.clone();
            let printer = thread::spawn(move || {
                let mut progress = BuildProgress::new(&output_dir);
                for event in rx {
                    progress.handle(&event);
                }
                progress.abandon();
            });
            let result = builder.run(Some(&tx));
            drop(tx);
            let _ = printer.join();
            let report = result?;

            output::print_build_summary(&report, &std::env::current_dir()?);
            if open {
                open_site(&report.output_dir)?;
            }
        }
        Command::Open => {
            let site_config = config::load_config(&cli.config)?;
            open_site(&site_config.build.output_directory)?;
        }
        Command::Sync { delay } => {
            let site_config = config::load_config(&cli.config)?;
            run_sync(&site_config, delay)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn open_site(output_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let Some(index) = pipeline::built_index(output_dir) else {
        eprintln!("{NOT_BUILT}");
        std::process::exit(1);
    };
    webbrowser::open(&index.to_string_lossy())?;
    Ok(())
}

fn run_sync(site_config: &SiteConfig, delay: Option<f64>) -> Result<(), Box<dyn std::error::Error>> {
    let delay = delay.unwrap_or(site_config.sync.delay);
    if !delay.is_finite() || delay <= 0.0 {
        return Err(format!("--delay must be a positive number of seconds, got {delay}").into());
    }
    let watch_dir = &site_config.build.output_directory;
    let result_dir = site_config.build.source_directory.clone();
    if !watch_dir.is_dir() {
        eprintln!("{NOT_BUILT}");
        std::process::exit(1);
    }

    ctrlc::set_handler(|| SHUTDOWN.store(true, Ordering::SeqCst))?;

    let (tx, rx) = mpsc::channel();
    let printer_root = result_dir.clone();
    let printer = thread::spawn(move || {
        for report in rx {
            output::print_sync_report(&report, &printer_root);
        }
    });

    println!("Waiting for static file changes in {}", watch_dir.display());
    println!("Press Ctrl-C to stop.\n");
    let mut watcher = SyncWatcher::new(watch_dir, result_dir, Duration::from_secs_f64(delay));
    let result = watcher.watch(&SHUTDOWN, Some(tx));
    let _ = printer.join();
    result?;
    println!("\nStopped watching for static file changes.");
    Ok(())
}
