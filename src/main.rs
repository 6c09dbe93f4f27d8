use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use treasure_fleet::controller::Controller;
use treasure_fleet::environment::{load_start_positions, Environment, Grid};
use treasure_fleet::settings::Settings;
use treasure_fleet::shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "Контролер флоту шукачів скарбів", long_about = None)]
struct Cli {
    /// Файл кімнати (`.` вільно, `X` перешкода, `T` скарб).
    #[arg(long = "room", short = 'r')]
    room: Option<PathBuf>,
    /// Файл стартових позицій, одна `(r, c)` на рядок.
    #[arg(long = "robots", short = 'b')]
    robots: Option<PathBuf>,
    #[arg(long, default_value = "Settings.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Ініціалізація структурованого логування (tracing) у stderr
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Не вдалося встановити tracing subscriber")?;

    // 2. Завантаження зовнішньої конфігурації
    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Пошкоджено файл конфігурації {}", cli.config.display()))?;
    if let Some(room) = cli.room {
        settings.fleet.room_file = room;
    }
    if let Some(robots) = cli.robots {
        settings.fleet.robots_file = robots;
    }

    // 3. Кімната і стартові позиції
    let grid = Grid::load(&settings.fleet.room_file).context("Не вдалося завантажити кімнату")?;
    let starts = load_start_positions(&settings.fleet.robots_file)
        .context("Не вдалося завантажити стартові позиції")?;
    let (rows, cols) = grid.dimensions();
    info!(rows, cols, treasures = grid.n_treasures(), agents = starts.len(), "Конфігурація завантажена");

    // 4. Запуск флоту; недопустима позиція зупиняє все до першої команди
    let controller = Controller::spawn(Arc::new(grid), &starts, settings)
        .context("Не вдалося запустити флот")?;

    // 5. Цикл команд оператора; Ctrl-C завершує роботу так само, як exit
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let report = shell::run(controller, stdin, &mut stdout, interrupt).await?;

    info!(found = report.treasures_found.len(), total = report.n_treasures, "Місія завершена");
    // Незавершене блокуюче читання stdin тримає runtime.
    std::process::exit(0)
}
