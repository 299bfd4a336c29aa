use std::{
    env::{self, args},
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use env_logger::{Builder, Env, Target};
use log::{error, info, warn};
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use regions_config::{ConfigStore, SaveFormat, default_config_path};
use regions_display::{SessionHandler, Window};
use regions_input::Editor;
use regions_renderer::{Canvas, LabelFont, draw_scene};
use regions_shared::{
    GlobalArgs, InputEvent, InputResponse, OutputSize, regions_to_percent, regions_to_pixels,
};

fn main() -> anyhow::Result<()> {
    let Some(global_args) = GlobalArgs::parse(args().skip(1)) else {
        return Ok(());
    };

    init_logger(global_args.log_file.as_deref())?;

    run_app(&global_args).inspect_err(|err| error!("An error occurred: {err:#}"))
}

fn init_logger(log_file: Option<&str>) -> anyhow::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(log_file) = log_file {
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("Failed to open log file {log_file}"))?;
        builder.target(Target::Pipe(Box::new(log_file)));
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{:<5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.init();

    Ok(())
}

/// Loads the regions, lets the user edit them on the overlay and writes them back
fn run_app(args: &GlobalArgs) -> anyhow::Result<()> {
    let config_path = match &args.config {
        Some(path) => PathBuf::from(path),
        None => default_config_path().context("Unable to locate labwc/rc.xml")?,
    };
    let config = ConfigStore::load(&config_path)?;

    let session = Session::new(config, LabelFont::load());
    let mut window = Window::connect(session).context("Unable to show the overlay")?;
    window.run()?;

    window
        .handler_mut()
        .save(&config_path, SaveFormat::from_env())?;
    notify_labwc();

    window.destroy()
}

/// The regions being edited and everything needed to show them
struct Session {
    config: ConfigStore,
    editor: Editor,
    font: Option<LabelFont>,
    /// Size of the last drawn frame. Percentages are turned into pixels on the first one.
    output: Option<OutputSize>,
}

impl Session {
    fn new(config: ConfigStore, font: Option<LabelFont>) -> Self {
        Self {
            config,
            editor: Editor::new(),
            font,
            output: None,
        }
    }

    /// Converts the regions back into the requested format and writes the config file. Regions
    /// that were never shown are still in their original units and are left untouched.
    fn save(&mut self, path: &Path, format: SaveFormat) -> anyhow::Result<()> {
        let Some(output) = self.output else {
            warn!("The overlay was never shown, not saving {}", path.display());
            return Ok(());
        };
        if format == SaveFormat::Percent {
            regions_to_percent(self.config.regions_mut(), output);
        }
        self.config.save(path, format)
    }
}

impl SessionHandler for Session {
    fn draw(&mut self, canvas: &mut Canvas<'_>) {
        let size = OutputSize::new(canvas.width(), canvas.height());
        if self.output.is_none() {
            info!("Showing regions on {}x{}", size.width, size.height);
            regions_to_pixels(self.config.regions_mut(), size);
        }
        self.output = Some(size);
        draw_scene(canvas, self.config.regions(), self.font.as_ref());
    }

    fn input(&mut self, event: InputEvent) -> InputResponse {
        self.editor.handle(event, self.config.regions_mut())
    }
}

/// labwc reloads its config on `SIGHUP`
fn notify_labwc() {
    let Some(value) = env::var_os("LABWC_PID") else {
        warn!("LABWC_PID is not set, labwc has to be reconfigured manually");
        return;
    };
    let Some(pid) = parse_pid(&value.to_string_lossy()) else {
        warn!("LABWC_PID {value:?} is not a process id");
        return;
    };
    match kill(pid, Signal::SIGHUP) {
        Ok(()) => info!("Asked labwc ({pid}) to reload its config"),
        Err(err) => warn!("Unable to signal labwc ({pid}): {err}"),
    }
}

fn parse_pid(value: &str) -> Option<Pid> {
    value
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .map(Pid::from_raw)
}
