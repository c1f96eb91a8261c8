// wardrobe - CLI for AI virtual try-on

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use termimad::{MadSkin, crossterm::style::Color};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wardrobe::tryon::config::CONFIG_FILE_NAME;
use wardrobe::tryon::dropzone::DropZone;
use wardrobe::tryon::ingest::IngestOutcome;
use wardrobe::tryon::notify::{
    FileFirstRunState, FirstRunState, LOADING_ROTATION, MemoryFirstRunState, Onboarding, Toaster,
    WELCOME_MARKDOWN, loading_message,
};
use wardrobe::tryon::preview::PreviewStore;
use wardrobe::tryon::regenerate::RegenerationError;
use wardrobe::tryon::{
    BackgroundSource, GeminiBackend, ImageFile, Orchestrator, ResultViewer, Session, ToastKind, TryOnConfig,
    UploadValidator, Uploader, ViewId,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Try clothes on from a photo using an AI image model", long_about = None)]
struct Cli {
    /// Config file (defaults to ./.wardrobe.toml, then ~/.wardrobe.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate all six views for a person and a clothing item
    Generate {
        /// Full-body photo of the person
        #[arg(short, long)]
        person: PathBuf,

        /// Photo of the clothing item
        #[arg(short = 'k', long)]
        clothing: PathBuf,

        /// Creative directives for pose, lighting or background
        #[arg(short, long, default_value = "")]
        directives: String,

        #[arg(short, long, value_enum, default_value = "auto")]
        background: BackgroundArg,

        /// Output directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Browse, zoom and regenerate results after generating
        #[arg(short, long)]
        interactive: bool,
    },

    /// Watch <inbox>/person and <inbox>/clothing and generate whenever both are filled
    Watch {
        #[arg(long)]
        inbox: PathBuf,

        #[arg(short, long, default_value = "")]
        directives: String,

        #[arg(short, long, value_enum, default_value = "auto")]
        background: BackgroundArg,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check images against the upload rules without generating anything
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Write a config file with default values
    InitConfig { path: Option<PathBuf> },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum BackgroundArg {
    /// Let the model pick a setting
    Auto,
    /// Keep the background of the person photo
    User,
    /// Use the background of the clothing photo
    Clothing,
}

impl From<BackgroundArg> for BackgroundSource {
    fn from(arg: BackgroundArg) -> Self {
        match arg {
            BackgroundArg::Auto => BackgroundSource::Auto,
            BackgroundArg::User => BackgroundSource::User,
            BackgroundArg::Clothing => BackgroundSource::Clothing,
        }
    }
}

fn create_markdown_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.headers[0].set_fg(Color::Magenta);
    skin.headers[1].set_fg(Color::Cyan);
    skin.bold.set_fg(Color::White);
    skin.inline_code.set_fg(Color::Yellow);
    skin
}

/// Prints each toast once
#[derive(Default)]
struct ToastPrinter {
    last: Option<i64>,
}

impl ToastPrinter {
    fn flush(&mut self, toaster: &Toaster) {
        let Some(toast) = toaster.current() else {
            return;
        };
        if self.last == Some(toast.id) {
            return;
        }
        self.last = Some(toast.id);
        match toast.kind {
            ToastKind::Success => println!("{} {}", "✓".green(), toast.message.as_str().green()),
            ToastKind::Error => println!("{} {}", "✗".red(), toast.message.as_str().red()),
        }
    }
}

/// Everything a generating command needs
struct App {
    config: TryOnConfig,
    session: Arc<Session>,
    person: Uploader,
    clothing: Uploader,
    toasts: ToastPrinter,
    skin: MadSkin,
}

impl App {
    fn new(config: TryOnConfig) -> Result<Self> {
        let backend = GeminiBackend::new(config.gemini_settings()?)?;
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(backend), config.request_timeout()));
        let session = Arc::new(Session::new(orchestrator, Toaster::new()));

        let previews = PreviewStore::new();
        let person = Uploader::new("Your Photo", UploadValidator::new(Arc::clone(&previews)));
        let clothing = Uploader::new("Clothing Item", UploadValidator::new(previews));

        Ok(Self {
            config,
            session,
            person,
            clothing,
            toasts: ToastPrinter::default(),
            skin: create_markdown_skin(),
        })
    }

    fn welcome(&self) {
        let state: Arc<dyn FirstRunState> = match FileFirstRunState::locate(self.config.state_dir.as_deref()) {
            Some(state) => Arc::new(state),
            None => Arc::new(MemoryFirstRunState::default()),
        };

        let mut onboarding = Onboarding::new(state);
        if onboarding.should_show() {
            self.skin.print_text(WELCOME_MARKDOWN);
            if let Err(e) = onboarding.dismiss() {
                tracing::warn!(error = %e, "could not save first-run state");
            }
        }
    }

    fn sync_inputs(&self) {
        self.session.set_person(self.person.current().image().cloned());
        self.session.set_clothing(self.clothing.current().image().cloned());
    }

    fn print_toasts(&mut self) {
        self.toasts.flush(self.session.toaster());
    }

    /// Run a bulk generation, showing a rotating caption until it settles
    async fn generate(&mut self) -> Result<usize> {
        let session = Arc::clone(&self.session);
        let generation = session.generate();
        tokio::pin!(generation);

        let mut ticker = tokio::time::interval(LOADING_ROTATION);
        let started = tokio::time::Instant::now();
        println!("{}", "Generating Your Look...".bold());

        let result = loop {
            tokio::select! {
                result = &mut generation => break result,
                _ = ticker.tick() => println!("  {}", loading_message(started.elapsed()).dim()),
            }
        };

        self.print_toasts();
        let produced = result?;
        println!("{} of 6 views generated", produced);
        Ok(produced)
    }

    fn save_all(&mut self, dir: &Path) -> Result<()> {
        let results = self.session.results();
        let mut viewer = ResultViewer::new();
        for index in 0..results.len() {
            viewer.select(index, &results, &HashSet::new());
            let path = self.session.export_active(&mut viewer, dir)?;
            println!("  {}", path.display());
        }
        self.print_toasts();
        Ok(())
    }

    fn output_dir(&self, output: Option<PathBuf>) -> PathBuf {
        output.unwrap_or_else(|| self.config.output_dir.clone())
    }
}

async fn pick(uploader: &Uploader, path: &Path) -> Result<()> {
    let file = ImageFile::from_path(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    uploader
        .pick(file)
        .await
        .with_context(|| format!("{}: {}", uploader.title(), path.display()))?;
    Ok(())
}

async fn run_generate(
    mut app: App,
    person: PathBuf,
    clothing: PathBuf,
    directives: String,
    background: BackgroundSource,
    output: Option<PathBuf>,
    interactive: bool,
) -> Result<()> {
    app.welcome();

    pick(&app.person, &person).await?;
    pick(&app.clothing, &clothing).await?;
    app.sync_inputs();
    app.session.set_directives(directives);
    app.session.set_background(background);

    app.generate().await?;

    let output = app.output_dir(output);
    if interactive {
        interactive_loop(&mut app, &output).await
    } else {
        println!("\nSaving to {}", output.display());
        app.save_all(&output)
    }
}

async fn interactive_loop(app: &mut App, output: &Path) -> Result<()> {
    let mut viewer = ResultViewer::new();
    println!("\nCommands: list, show <n>, zoom in|out|reset, pan <dx> <dy>, regen <view>, save, all, quit\n");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let words: Vec<&str> = input.split_whitespace().collect();
        let results = app.session.results();
        let regenerating = app.session.regenerating();

        match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            ["list"] => {
                for (i, thumb) in viewer.thumbnails(&results, &regenerating).iter().enumerate() {
                    let marker = if thumb.active { "*" } else { " " };
                    println!("{} {}. {} ({})", marker, i + 1, thumb.title, thumb.view);
                }
            }
            ["show", n] => match n.parse::<usize>() {
                Ok(n) if n >= 1 && viewer.select(n - 1, &results, &regenerating) => print_active(&viewer, &results),
                _ => println!("No selectable image {}", n),
            },
            ["zoom", "in"] => {
                viewer.zoom_mut().zoom_in();
                print_active(&viewer, &results);
            }
            ["zoom", "out"] => {
                viewer.zoom_mut().zoom_out();
                print_active(&viewer, &results);
            }
            ["zoom", "reset"] => {
                viewer.zoom_mut().reset();
                print_active(&viewer, &results);
            }
            ["pan", dx, dy] => match (dx.parse::<f32>(), dy.parse::<f32>()) {
                (Ok(dx), Ok(dy)) => {
                    let zoom = viewer.zoom_mut();
                    zoom.pointer_down();
                    zoom.pointer_move(dx, dy);
                    zoom.pointer_up();
                    print_active(&viewer, &results);
                }
                _ => println!("Usage: pan <dx> <dy>"),
            },
            ["regen", view] => match view.parse::<ViewId>() {
                Ok(view) => {
                    println!("Regenerating {}...", view.title());
                    match app.session.regenerate(view).await {
                        Ok(_) | Err(RegenerationError::Failed { .. }) => app.print_toasts(),
                        Err(e) => println!("{}", e.to_string().red()),
                    }
                }
                Err(e) => println!("{}", e),
            },
            ["save"] => match app.session.export_active(&mut viewer, output) {
                Ok(path) => {
                    app.print_toasts();
                    println!("  {}", path.display());
                }
                Err(e) => println!("{}", e.to_string().red()),
            },
            ["all"] => app.save_all(output)?,
            _ => println!("Unknown command"),
        }
    }

    Ok(())
}

fn print_active(viewer: &ResultViewer, results: &[wardrobe::tryon::GeneratedImage]) {
    let Some(image) = viewer.active(results) else {
        println!("No results");
        return;
    };
    let zoom = viewer.zoom();
    println!(
        "{} [{} bytes, {}]  {}  cursor: {:?}",
        image.title.as_str().bold(),
        image.image.data.len(),
        image.image.mime_type,
        zoom.transform(),
        zoom.cursor()
    );
}

async fn run_watch(
    mut app: App,
    inbox: PathBuf,
    directives: String,
    background: BackgroundSource,
    output: Option<PathBuf>,
) -> Result<()> {
    app.welcome();
    app.session.set_directives(directives);
    app.session.set_background(background);

    let debounce = Duration::from_millis(app.config.watch.debounce_ms);
    let patterns = app.config.watch.ignore_patterns.clone();
    let mut person_zone = DropZone::watch(inbox.join("person"), patterns.clone(), debounce)?;
    let mut clothing_zone = DropZone::watch(inbox.join("clothing"), patterns, debounce)?;
    let output = app.output_dir(output);

    println!("Drop a photo into {}", person_zone.dir().display());
    println!("Drop a clothing item into {}", clothing_zone.dir().display());
    println!("Watching for changes... (Press Ctrl+C to stop)\n");

    loop {
        let (uploader, file) = tokio::select! {
            Some(file) = person_zone.next() => (&app.person, file),
            Some(file) = clothing_zone.next() => (&app.clothing, file),
            _ = tokio::signal::ctrl_c() => break,
        };

        let name = file.name.clone();
        match uploader.drop_files(vec![file]).await {
            Some(Ok(IngestOutcome::Accepted)) => println!("{} {}: {}", "+".green(), uploader.title(), name),
            Some(Ok(IngestOutcome::Superseded)) => continue,
            Some(Err(e)) => {
                println!("{} {}: {}", "✗".red(), name, e);
                continue;
            }
            None => continue,
        }

        app.sync_inputs();
        if !app.session.can_generate() {
            continue;
        }

        let run_dir = output.join(chrono::Local::now().format("%Y%m%d-%H%M%S").to_string());
        match app.generate().await {
            Ok(_) => app.save_all(&run_dir)?,
            Err(e) => println!("{}", e.to_string().red()),
        }
    }

    Ok(())
}

async fn run_validate(files: Vec<PathBuf>) -> Result<()> {
    let validator = UploadValidator::new(PreviewStore::new());
    let mut failed = 0;

    for path in &files {
        let result = match ImageFile::from_path(path).await {
            Ok(file) => validator.validate(file).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match result {
            Ok(validated) => println!(
                "{} {} ({}x{}, {})",
                "✓".green(),
                path.display(),
                validated.image.width,
                validated.image.height,
                validated.image.file.mime_type
            ),
            Err(e) => {
                failed += 1;
                println!("{} {}: {}", "✗".red(), path.display(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} files rejected", failed, files.len());
    }
    Ok(())
}

fn run_init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    TryOnConfig::default().to_file(&path)?;
    println!("Created {}", path.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<TryOnConfig> {
    match path {
        Some(path) => TryOnConfig::from_file(path).with_context(|| format!("failed to load {}", path.display())),
        None => Ok(TryOnConfig::load()?.0),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env may hold the API key
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded .env file from: {}", path.display());
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wardrobe={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match cli.command {
        Command::Generate {
            person,
            clothing,
            directives,
            background,
            output,
            interactive,
        } => {
            let app = App::new(load_config(cli.config.as_deref())?)?;
            run_generate(app, person, clothing, directives, background.into(), output, interactive).await
        }
        Command::Watch {
            inbox,
            directives,
            background,
            output,
        } => {
            let app = App::new(load_config(cli.config.as_deref())?)?;
            run_watch(app, inbox, directives, background.into(), output).await
        }
        Command::Validate { files } => run_validate(files).await,
        Command::InitConfig { path } => run_init_config(path),
    }
}
