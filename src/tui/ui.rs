//! UI rendering for the debugger.

use super::app::DebuggerApp;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(frame.area());

    // Left side: program listing and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(3),
            Constraint::Length(6),
        ])
        .split(chunks[0]);

    draw_listing(frame, left_chunks[0], app);
    draw_status(frame, left_chunks[1], app);
    draw_help(frame, left_chunks[2]);

    // Right side: machine state, memory and output
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(12),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_machine_state(frame, right_chunks[0], app);
    draw_memory(frame, right_chunks[1], app);
    draw_output(frame, right_chunks[2], app);
}

/// Program listing with the PC marker and breakpoints.
fn draw_listing(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let items: Vec<ListItem> = app
        .listing()
        .iter()
        .map(|(addr, text, is_current, has_bp)| {
            let marker = if *is_current { "▶" } else { " " };
            let bp = if *has_bp { "●" } else { " " };
            let line = format!("{}{} {:03}: {}", bp, marker, addr, text);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if *has_bp {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(line).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Program ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

/// Latches, flags, register file and the active microprogram.
fn draw_machine_state(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu = &app.cpu;
    let flags = cpu.flags();

    let mut lines = vec![
        Line::from(format!(
            "PC={:<6} MAR={:<6} MBR={}",
            cpu.pc(),
            cpu.mar(),
            cpu.mbr()
        )),
        Line::from(format!("IR: {}", cpu.ir().unwrap_or("<empty>"))),
        Line::from(format!(
            "Flags: Z={} C={} S={} O={}",
            flag(flags.zero),
            flag(flags.carry),
            flag(flags.sign),
            flag(flags.overflow)
        )),
        Line::from(match cpu.micro_position() {
            Some((mnemonic, cursor)) => format!("Microprogram: {} [{}]", mnemonic, cursor),
            None => "Microprogram: <fetch boundary>".to_string(),
        }),
        Line::from(format!("Signals executed: {}", cpu.cycles())),
        Line::from(""),
    ];

    for (name, value) in cpu.registers().snapshot() {
        lines.push(Line::from(format!("  {:<8} = {}", name, value)));
    }

    let para = Paragraph::new(lines).block(
        Block::default()
            .title(" Machine State ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(para, area);
}

/// Data memory window.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows = area.height.saturating_sub(2) as usize;
    let window = app.cpu.memory().dump(app.mem_scroll, rows);

    let items: Vec<ListItem> = window
        .iter()
        .map(|(addr, value)| {
            let style = if *value != 0 {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            ListItem::new(format!("{:04}: {:>12}", addr, value)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

/// Collected output-device text.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let text = app.output.borrow().output_text();
    let para = Paragraph::new(text).block(
        Block::default()
            .title(" Output ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(para, area);
}

/// Status line.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let style = if app.cpu.is_halted() {
        Style::default().fg(Color::Red)
    } else if app.running {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };

    let para = Paragraph::new(app.status.as_str())
        .style(style)
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(para, area);
}

/// Key bindings.
fn draw_help(frame: &mut Frame, area: Rect) {
    let text = "s: step signal   n: step instruction   r: run   p: pause\n\
                b: breakpoint    x: reset              ↑/↓: scroll memory\n\
                q: quit";
    let para = Paragraph::new(text).block(
        Block::default()
            .title(" Keys ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(para, area);
}

fn flag(on: bool) -> char {
    if on {
        '1'
    } else {
        '0'
    }
}
