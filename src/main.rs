//! tabterm - A minimal tabbed terminal emulator
//!
//! tabterm runs one shell per tab on its own pseudo-terminal and shows the
//! front window full-screen in the hosting console.
//!
//! # Features
//!
//! - **Tabs**: New tabs start in the current tab's working directory
//! - **Windows**: Several windows, the newest one in front
//! - **URLs**: Click a link to open it with the configured browser
//! - **Clipboard**: Copy the mouse selection (double-click selects a word),
//!   paste into the shell
//! - **Key file config**: `[general]`, `[ui]` and `[colour scheme]` groups
//!
//! # Quick Start
//!
//! ```text
//! tabterm                     # Use ~/.config/tabterm/tabterm.conf
//! tabterm -c ./tabterm.conf   # Use another config file
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+Shift+N | New window |
//! | Ctrl+Shift+T | New tab |
//! | Ctrl+Shift+H | Toggle tab bar |
//! | Ctrl+Shift+W | Close tab |
//! | Ctrl+Shift+C | Copy selection |
//! | Ctrl+Shift+V | Paste |
//! | Alt+Left/Right | Previous/Next tab |
//! | Alt+F11 | Toggle fullscreen |
//!
//! Consoles without keyboard enhancement report Ctrl+Shift+letter the same
//! as Ctrl+letter, so those shortcuts need a console that supports it.

mod config;
mod core;
mod event;
mod keyfile;
mod launch;
#[cfg(test)]
mod testing;
mod ui;
mod wm;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::error::ErrorKind;
use clap::Parser;
use crossterm::event::{self as console, KeyEventKind, MouseEvent, MouseEventKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{Settings, PROGRAM_NAME};
use crate::core::vt::{VtFactory, VtTerminal};
use crate::event::{ButtonPress, Event, KeyPress, MouseButton, Propagation};
use crate::launch::CommandLauncher;
use crate::ui::{tab_at, tab_spans, window_labels, KeyMapper, Renderer};
use crate::wm::{WindowId, WindowManager};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter
const LOG_ENV: &str = "TABTERM_LOG";

const POLL_TIMEOUT: Duration = Duration::from_millis(10);

const DOUBLE_CLICK: Duration = Duration::from_millis(400);

/// Lines moved per wheel step
const SCROLL_STEP: isize = 3;

/// A minimal tabbed terminal emulator
#[derive(Parser, Debug)]
#[command(name = PROGRAM_NAME, version, about)]
struct Cli {
    /// Configuration file to load instead of the default
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Log to a file; the console belongs to the UI
fn init_logging() {
    let log_dir = dirs::data_local_dir()
        .map(|dir| dir.join(PROGRAM_NAME))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = fs::create_dir_all(&log_dir);

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(format!("{}.log", PROGRAM_NAME)))
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Exit status for a command line that did not parse into a [`Cli`]
fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = exit_code(e.kind());
            if code == 0 {
                e.print()?;
                return Ok(());
            }
            error!("Invalid command line: {}", e);
            let _ = e.print();
            std::process::exit(code);
        }
    };

    info!("{} {} starting", PROGRAM_NAME, VERSION);

    let config_path = cli.config.unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&config_path);

    let result = run(settings);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    info!("{} exiting", PROGRAM_NAME);
    result
}

fn run(settings: Settings) -> anyhow::Result<()> {
    let (width, height) = Renderer::size().context("Failed to query console size")?;
    let factory = VtFactory::new(width, height);
    let mut wm = WindowManager::new(settings, factory, Box::new(CommandLauncher));

    let mut renderer = Renderer::new();
    renderer.init().context("Failed to set up the console")?;

    let result = if wm.new_window().is_some() {
        run_main_loop(&mut wm, &mut renderer)
    } else {
        Err(anyhow::anyhow!("Could not start a shell"))
    };

    renderer.cleanup().context("Failed to restore the console")?;
    result
}

/// Pointer state carried between console events
#[derive(Default)]
struct PointerState {
    /// Tab bar page pressed, for drag reordering
    drag_from: Option<usize>,
    selecting: bool,
    /// Pointer cell in the content area
    hover: Option<(u16, u16)>,
    last_click: Option<(Instant, (u16, u16))>,
}

fn run_main_loop(wm: &mut WindowManager<VtFactory>, renderer: &mut Renderer) -> anyhow::Result<()> {
    let mut pointer = PointerState::default();

    loop {
        for event in wm.poll() {
            wm.dispatch(event);
        }
        if !wm.is_running() {
            info!("All windows closed");
            break;
        }
        let Some(window) = wm.active_window() else {
            bail!("No window to show");
        };

        let (width, height) = Renderer::size()?;
        wm.fit_window(window, width as i32, height as i32);

        if let Some(bell) = wm.current_terminal_mut(window).and_then(VtTerminal::take_bell) {
            renderer.bell(bell)?;
        }
        renderer.render(wm, pointer.hover)?;

        match read_console_event() {
            Ok(Some(event)) => handle_console_event(wm, &mut pointer, window, event),
            Ok(None) => {}
            Err(e) => {
                warn!("Console input lost: {}", e);
                destroy_all_windows(wm);
            }
        }
    }

    Ok(())
}

fn read_console_event() -> std::io::Result<Option<console::Event>> {
    if console::poll(POLL_TIMEOUT)? {
        console::read().map(Some)
    } else {
        Ok(None)
    }
}

/// The console went away; tear every window down
fn destroy_all_windows(wm: &mut WindowManager<VtFactory>) {
    while let Some(window) = wm.active_window() {
        wm.dispatch(Event::Destroy { window });
    }
}

fn handle_console_event(
    wm: &mut WindowManager<VtFactory>,
    pointer: &mut PointerState,
    window: WindowId,
    event: console::Event,
) {
    match event {
        console::Event::Key(key_event) => {
            if key_event.kind == KeyEventKind::Release {
                return;
            }
            let key = KeyPress::from(&key_event);
            if wm.dispatch(Event::Key { window, key }) == Propagation::Stop {
                return;
            }
            if let Some(terminal) = wm.current_terminal_mut(window) {
                if let Some(bytes) = KeyMapper::map(&key_event, terminal.application_cursor()) {
                    terminal.write_input(&bytes);
                }
            }
        }
        console::Event::Paste(text) => {
            if let Some(terminal) = wm.current_terminal_mut(window) {
                terminal.paste_text(&text);
            }
        }
        console::Event::Mouse(mouse) => handle_mouse(wm, pointer, window, mouse),
        console::Event::Resize(width, height) => {
            debug!("Console resized to {}x{}", width, height);
            wm.factory_mut().set_size(width, height);
        }
        _ => {}
    }
}

fn handle_mouse(
    wm: &mut WindowManager<VtFactory>,
    pointer: &mut PointerState,
    window: WindowId,
    mouse: MouseEvent,
) {
    use crossterm::event::MouseButton as Button;

    let show_tabs = wm.window(window).map(|w| w.show_tabs).unwrap_or(false);

    if show_tabs && mouse.row == 0 {
        let Some(w) = wm.window(window) else {
            return;
        };
        let spans = tab_spans(&window_labels(wm, w));
        let page = tab_at(&spans, mouse.column);
        match mouse.kind {
            MouseEventKind::Down(Button::Left) => {
                pointer.drag_from = page;
                if let Some(page) = page {
                    wm.dispatch(Event::SwitchPage { window, page });
                }
            }
            MouseEventKind::Up(Button::Left) => {
                if let (Some(from), Some(to)) = (pointer.drag_from.take(), page) {
                    if from != to {
                        wm.dispatch(Event::ReorderPage { window, from, to });
                    }
                }
            }
            _ => {}
        }
        pointer.hover = None;
        return;
    }

    let column = mouse.column;
    let row = mouse.row.saturating_sub(u16::from(show_tabs));
    let Some(tab) = wm.current_tab(window) else {
        return;
    };

    if let MouseEventKind::Down(button) = mouse.kind {
        pointer.drag_from = None;
        let press = ButtonPress {
            button: match button {
                Button::Left => MouseButton::Primary,
                Button::Middle => MouseButton::Middle,
                Button::Right => MouseButton::Secondary,
            },
            x: column as f64,
            y: row as f64,
        };
        if wm.dispatch(Event::Button { tab, press }) == Propagation::Stop {
            return;
        }
    }

    let Some(terminal) = wm.tab_mut(tab).map(|t| &mut t.terminal) else {
        return;
    };
    if forward_mouse(terminal, &mouse, column, row) {
        return;
    }

    match mouse.kind {
        MouseEventKind::Down(Button::Left) => {
            let now = Instant::now();
            let double = pointer
                .last_click
                .map(|(at, cell)| cell == (column, row) && now.duration_since(at) < DOUBLE_CLICK)
                .unwrap_or(false);
            if double {
                terminal.select_word(column, row);
                pointer.last_click = None;
                pointer.selecting = false;
            } else {
                terminal.start_selection(column, row);
                pointer.last_click = Some((now, (column, row)));
                pointer.selecting = true;
            }
        }
        MouseEventKind::Drag(Button::Left) if pointer.selecting => {
            terminal.extend_selection(column, row);
        }
        MouseEventKind::Up(Button::Left) => pointer.selecting = false,
        MouseEventKind::ScrollUp => terminal.scroll_view(SCROLL_STEP),
        MouseEventKind::ScrollDown => terminal.scroll_view(-SCROLL_STEP),
        MouseEventKind::Moved => pointer.hover = Some((column, row)),
        _ => {}
    }
}

/// Hand a mouse event to a child that asked for mouse reporting
fn forward_mouse(terminal: &mut VtTerminal, mouse: &MouseEvent, column: u16, row: u16) -> bool {
    let screen = terminal.screen();
    let mode = screen.mouse_protocol_mode();
    if mode == vt100::MouseProtocolMode::None {
        return false;
    }
    let encoding = screen.mouse_protocol_encoding();
    let local = MouseEvent {
        column,
        row,
        ..*mouse
    };
    if let Some(bytes) = KeyMapper::encode_mouse_event(&local, mode, encoding) {
        terminal.write_input(&bytes);
    }
    true
}
