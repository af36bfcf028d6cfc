use std::error::Error;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::control::api::{ButtonLabel, Controller};
use crate::engine::{DeviceInfo, LoopbackEngine};
use crate::state::RunState;

const TICK_RATE: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
struct ConsoleStatus {
    run_state: RunState,
    results: Vec<String>,
}

impl ConsoleStatus {
    fn capture(engine: &LoopbackEngine) -> Self {
        Self {
            run_state: engine.run_state(),
            results: engine.results().snapshot(),
        }
    }
}

struct AppState {
    device: Option<DeviceInfo>,
    status: Option<ConsoleStatus>,
    label: ButtonLabel,
    message: Option<String>,
    last_update: Option<Instant>,
}

/// Run the console until the user quits.
///
/// `Space`/`Enter` presses the start/stop button, `q`/`Esc` quits.
pub fn run(controller: &mut Controller, device: Option<DeviceInfo>) -> Result<(), Box<dyn Error>> {
    setup_terminal()?;
    let result = run_loop(controller, device);
    restore_terminal()?;
    result
}

fn run_loop(controller: &mut Controller, device: Option<DeviceInfo>) -> Result<(), Box<dyn Error>> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (status_tx, status_rx) = unbounded();
    let engine = Arc::clone(controller.engine());
    std::thread::spawn(move || {
        loop {
            if status_tx.send(ConsoleStatus::capture(&engine)).is_err() {
                break;
            }
            std::thread::sleep(TICK_RATE);
        }
    });

    let mut app = AppState {
        device,
        status: None,
        label: controller.label(),
        message: None,
        last_update: None,
    };

    loop {
        terminal.draw(|frame| draw(frame, &app))?;

        if let Some(status) = try_recv_latest(&status_rx) {
            app.status = Some(status);
            app.label = controller.refresh();
            app.last_update = Some(Instant::now());
        }

        if event::poll(Duration::from_millis(10))? {
            if let CEvent::Key(key) = event::read()? {
                if handle_key(&mut app, controller, key) {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn setup_terminal() -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    Ok(())
}

fn restore_terminal() -> Result<(), Box<dyn Error>> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

fn try_recv_latest<T>(rx: &Receiver<T>) -> Option<T> {
    let mut last = None;
    while let Ok(value) = rx.try_recv() {
        last = Some(value);
    }
    last
}

fn handle_key(app: &mut AppState, controller: &mut Controller, key: KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Char(' ') | KeyCode::Enter => {
            app.label = controller.start_test();
            app.message = Some(match app.label {
                ButtonLabel::Stop => "Loopback running, speak into the microphone".to_string(),
                ButtonLabel::Start => "Loopback stopped".to_string(),
            });
        }
        _ => {}
    }
    false
}

fn draw(frame: &mut ratatui::Frame<'_>, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(4),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], app);
    draw_results(frame, chunks[1], app);
    draw_button(frame, chunks[2], app);
    draw_footer(frame, chunks[3], app);
}

fn draw_header(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default().title("Unmute Console").borders(Borders::ALL);

    let content = if let Some(device) = &app.device {
        Paragraph::new(format!(
            "Device: {}    Sample Rate: {} Hz    Buffer: {} frames    Latency: {:.2} ms    I/O: {} in / {} out",
            device.name,
            device.sample_rate,
            device.buffer_frames,
            device.latency_ms(),
            device.input_channels,
            device.output_channels,
        ))
    } else {
        Paragraph::new(Line::from(vec![Span::styled(
            "No audio device open",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )]))
    };

    frame.render_widget(content.block(block), area);
}

fn draw_results(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default().title("Results").borders(Borders::ALL);
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = app
        .status
        .as_ref()
        .map(|status| {
            let skip = status.results.len().saturating_sub(visible);
            status.results[skip..]
                .iter()
                .map(|line| Line::from(line.clone()))
                .collect()
        })
        .unwrap_or_default();

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn draw_button(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let active = app
        .status
        .as_ref()
        .map(|status| status.run_state.is_active())
        .unwrap_or(false);
    let style = if active {
        Style::default().fg(Color::Black).bg(Color::Green)
    } else {
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
    };

    let paragraph = Paragraph::new(Span::styled(app.label.as_str(), style))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

fn draw_footer(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let info = "Space/Enter: Start/Stop  •  q: Quit";
    let mut lines = vec![Line::from(info)];
    if let Some(message) = &app.message {
        lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Green),
        )));
    }
    if let Some(updated) = app.last_update {
        let ago = updated.elapsed().as_secs_f32();
        lines.push(Line::from(Span::styled(
            format!("Last update {:.1}s ago", ago),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use super::*;

    fn app() -> AppState {
        AppState {
            device: None,
            status: None,
            label: ButtonLabel::Start,
            message: None,
            last_update: None,
        }
    }

    #[test]
    fn space_toggles_and_q_quits() {
        let mut controller = Controller::new(Arc::new(LoopbackEngine::new()));
        let mut app = app();

        let space = KeyEvent::new(KeyCode::Char(' '), KeyModifiers::NONE);
        assert!(!handle_key(&mut app, &mut controller, space));
        assert_eq!(app.label, ButtonLabel::Stop);
        assert!(controller.engine().is_active());

        let quit = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert!(handle_key(&mut app, &mut controller, quit));
    }

    #[test]
    fn status_capture_reads_engine() {
        let engine = LoopbackEngine::new();
        engine.begin_test();
        let status = ConsoleStatus::capture(&engine);
        assert_eq!(status.run_state, RunState::Active);
        assert!(status.results.contains(&"Starting test...".to_string()));
    }
}
