use clap::{Parser, Subcommand};
use quire::discover::WalkLoader;
use quire::html::HtmlRenderer;
use quire::site::Generator;
use quire::{config, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quire")]
#[command(version, about = "Static site generator for Markdown with front matter")]
#[command(long_about = "\
Static site generator for Markdown with front matter

Every .md file under the project root is a page. An optional front-matter
block at the top of the file sets its metadata:

  ---                 YAML
  +++                 TOML
  ;;;                 JSON

Project structure:

  site/
  ├── _quire.yml              # Config (optional): site metadata + build settings
  ├── about.md                # No section → home, written to _site/home/about.html
  ├── posts/
  │   └── hello.md            # section: blog → _site/blog/hello.html
  ├── assets/                 # Listed under build.static → copied to _site/assets/
  ├── _drafts/                # Leading _ or . → ignored
  └── _site/                  # Output, rebuilt from scratch on every run
                              # _site/index.html is always the home page

Front-matter keys read by the build:
  section   Output directory for the page (default: home)
  tags      List or comma-separated string; one index per tag under tags/
  slug      Output file name (default: source file stem)
  view      Built-in view: post, page (default: build.default_view)
  title     Page title (default: source file stem)

Run 'quire gen-config' to generate a documented _quire.yml.")]
struct Cli {
    /// Project directory
    #[arg(long, default_value = ".", global = true)]
    source: PathBuf,

    /// Output directory (default: build.output_dir from the config)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Log progress at INFO level (otherwise RUST_LOG applies)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load, partition and write the site
    Build,
    /// Load and partition without writing anything
    Check,
    /// Print a stock _quire.yml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Build => {
            let generator = generator(&cli)?;
            println!("==> Building {}", generator.root().display());
            let (site, report) = generator.build()?;
            output::print_build_output(&site, &report);
        }
        Command::Check => {
            let generator = generator(&cli)?;
            println!("==> Checking {}", generator.root().display());
            let site = generator.collect()?;
            output::print_check_output(&site, generator.root());
            println!("==> Content is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_yaml());
        }
    }

    Ok(())
}

type StandardGenerator = Generator<WalkLoader, HtmlRenderer>;

fn generator(cli: &Cli) -> Result<StandardGenerator, Box<dyn std::error::Error>> {
    let mut generator = Generator::standard(&cli.source)?;
    if let Some(output) = &cli.output {
        generator = generator.with_output(output);
    }
    init_thread_pool(&generator.config().build);
    Ok(generator)
}

/// Initialize the rayon thread pool based on build config.
///
/// Caps at the number of available CPU cores. User can constrain down, not up.
fn init_thread_pool(build: &config::BuildConfig) {
    let threads = config::effective_threads(build);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
