use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent, MouseButton, MouseEvent,
    MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::engine::Engine;
use crate::led::{GRID_COLS, GRID_ROWS, PadColor};

/// Width of one cell on screen, including the separator column.
const CELL_W: u16 = 3;
/// Two taps on the same cell within this window set the pattern length.
const DOUBLE_TAP: Duration = Duration::from_millis(400);

/// Terminal grid frontend: renders the shared frame buffer as a 6x8 pad
/// grid and turns mouse presses into cell events, so the sequencer is
/// playable without hardware pads. `e` switches the mouse between playing
/// cells and editing the underlying patterns.
pub struct Ui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    edit_mode: bool,
    /// Virtual pad pressure applied to mouse presses.
    pressure: f32,
    held: Option<(usize, usize)>,
    last_tap: Option<(Instant, usize, usize)>,
    grid_area: Rect,
}

impl Ui {
    pub fn new() -> anyhow::Result<Self> {
        execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        Ok(Ui {
            terminal,
            edit_mode: false,
            pressure: 0.8,
            held: None,
            last_tap: None,
            grid_area: Rect::default(),
        })
    }

    pub fn draw(&mut self, engine: &Engine) -> anyhow::Result<()> {
        let mut grid_area = Rect::default();
        let edit_mode = self.edit_mode;
        let pressure = self.pressure;

        self.terminal.draw(|frame| {
            let [grid, status] = Layout::vertical([
                Constraint::Length(GRID_ROWS as u16 + 2),
                Constraint::Length(1),
            ])
            .areas(frame.area());

            let title = if edit_mode { " padcafe · edit " } else { " padcafe " };
            let block = Block::default().borders(Borders::ALL).title(title);
            grid_area = block.inner(grid);

            let mut lines = Vec::with_capacity(GRID_ROWS);
            for row in 0..GRID_ROWS {
                let pattern = engine.pattern(row);
                let mut spans = Vec::with_capacity(GRID_COLS);
                for col in 0..GRID_COLS {
                    let (glyph, style) = match engine.frame().color_at(row, col) {
                        Some(PadColor::Primary) => ("██", Style::default().fg(Color::Red)),
                        Some(PadColor::Secondary) => ("██", Style::default().fg(Color::Yellow)),
                        None if edit_mode => {
                            let in_window = col < pattern.length();
                            match (pattern.steps()[col], in_window) {
                                (true, true) => ("▓▓", Style::default().fg(Color::Green)),
                                (true, false) => ("▓▓", Style::default().fg(Color::DarkGray)),
                                (false, true) => ("··", Style::default().fg(Color::Gray)),
                                (false, false) => ("··", Style::default().fg(Color::DarkGray)),
                            }
                        }
                        None => ("··", Style::default().fg(Color::DarkGray)),
                    };
                    spans.push(Span::styled(glyph, style));
                    spans.push(Span::raw(" "));
                }
                lines.push(Line::from(spans));
            }
            frame.render_widget(Paragraph::new(lines).block(block), grid);

            let store = engine.store();
            let status_line = format!(
                " {:.0} BPM │ latency {:.0} ms │ {} │ pressure {:.0}% │ {} playing │ e edit · t mode · +/- tempo · q quit",
                store.bpm(),
                store.latency * 1000.0,
                if store.toggle_mode { "toggle" } else { "hold" },
                pressure * 100.0,
                engine.active_count(),
            );
            frame.render_widget(
                Paragraph::new(status_line).style(Style::default().fg(Color::Gray)),
                status,
            );
        })?;

        self.grid_area = grid_area;
        Ok(())
    }

    /// Handle a key press. Returns true when the app should quit.
    pub fn handle_key(&mut self, event: KeyEvent, engine: &mut Engine, now_us: u64) -> bool {
        match event.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('e') => {
                self.edit_mode = !self.edit_mode;
                // Entering edit mode drops any mouse-held cell.
                self.release_held(engine, now_us);
            }
            KeyCode::Char('t') => engine.flip_toggle_mode(),
            KeyCode::Char('+') | KeyCode::Char('=') => engine.nudge_bpm(2.0),
            KeyCode::Char('-') => engine.nudge_bpm(-2.0),
            KeyCode::Char(']') => self.pressure = (self.pressure + 0.1).min(1.0),
            KeyCode::Char('[') => self.pressure = (self.pressure - 0.1).max(0.1),
            _ => {}
        }
        false
    }

    pub fn handle_mouse(&mut self, event: MouseEvent, engine: &mut Engine, now_us: u64) {
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let Some((row, col)) = self.hit_test(event.column, event.row) else {
                    return;
                };
                if self.edit_mode {
                    self.edit_tap(row, col, engine);
                } else {
                    self.held = Some((row, col));
                    engine.on_cell_edge(now_us, row, col, self.pressure);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => self.release_held(engine, now_us),
            _ => {}
        }
    }

    /// Mouse edit surface: a tap toggles the step, a double tap on the
    /// same cell sets that row's length to the tapped column (reverting
    /// the first tap's toggle).
    fn edit_tap(&mut self, row: usize, col: usize, engine: &mut Engine) {
        let now = Instant::now();
        let doubled = matches!(
            self.last_tap,
            Some((at, r, c)) if r == row && c == col && now.duration_since(at) <= DOUBLE_TAP
        );

        let pattern = engine.pattern_mut(row);
        if doubled {
            pattern.toggle_step(col);
            pattern.set_length(col + 1);
            self.last_tap = None;
        } else {
            pattern.toggle_step(col);
            self.last_tap = Some((now, row, col));
        }
    }

    fn release_held(&mut self, engine: &mut Engine, now_us: u64) {
        if let Some((row, col)) = self.held.take() {
            engine.on_cell_edge(now_us, row, col, 0.0);
        }
    }

    fn hit_test(&self, x: u16, y: u16) -> Option<(usize, usize)> {
        let area = self.grid_area;
        if x < area.x || y < area.y || y >= area.y + area.height {
            return None;
        }
        let row = (y - area.y) as usize;
        let col = ((x - area.x) / CELL_W) as usize;
        if row < GRID_ROWS && col < GRID_COLS && (x - area.x) % CELL_W < 2 {
            Some((row, col))
        } else {
            None
        }
    }
}

impl Drop for Ui {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
    }
}
