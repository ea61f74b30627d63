//! Debugger application state and logic.

use crate::cpu::{Cpu, Memory, StepState, DEFAULT_MEMORY_SIZE};
use crate::io::{BufferDevice, SharedDevice};
use std::collections::HashSet;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Original program for reloads and the listing panel.
    pub program: Vec<String>,
    /// Breakpoints (by instruction address).
    pub breakpoints: HashSet<i32>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
    /// Externally-driven input device (slot 0).
    pub input: SharedDevice<BufferDevice>,
    /// Externally-driven output device (slot 1).
    pub output: SharedDevice<BufferDevice>,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program and buffer devices.
    pub fn new(program: Vec<String>) -> Self {
        let input = SharedDevice::new(BufferDevice::new("debug-in"));
        let output = SharedDevice::new(BufferDevice::new("debug-out"));
        let mut cpu = Cpu::new(
            Memory::new(DEFAULT_MEMORY_SIZE),
            vec![Box::new(input.clone()), Box::new(output.clone())],
        );
        cpu.load_program(program.clone());

        Self {
            cpu,
            program,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. 's' steps a signal, 'n' an instruction, 'r' runs, 'q' quits.".into(),
            mem_scroll: 0,
            input,
            output,
        }
    }

    /// Execute one control signal.
    pub fn step_signal(&mut self) {
        match self.cpu.step() {
            StepState::Running(signal) => {
                self.status = format!("PC={:03}  signal: {}", self.cpu.pc(), signal);
            }
            StepState::Halted(reason) => {
                self.status = format!("Halted: {}", reason);
                self.running = false;
            }
        }
    }

    /// Execute signals until the next instruction boundary (the point where
    /// the active microprogram has completed and FETCH would re-enter).
    pub fn step_instruction(&mut self) {
        loop {
            if self.cpu.is_halted() {
                return;
            }
            self.step_signal();
            if self.cpu.is_halted() || self.cpu.micro_position().is_none() {
                return;
            }
        }
    }

    /// Switch to continuous execution.
    pub fn run(&mut self) {
        if self.cpu.is_halted() {
            self.status = "CPU is halted. Press 'x' to reset.".into();
            return;
        }
        self.running = true;
        self.status = "Running...".into();
    }

    /// One iteration of continuous execution; checks breakpoints at
    /// instruction boundaries.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        if self.cpu.is_halted() {
            self.running = false;
            self.status = format!(
                "Halted after {} signals: {}",
                self.cpu.cycles(),
                self.cpu
                    .halt_reason()
                    .map(|r| r.to_string())
                    .unwrap_or_default()
            );
            return;
        }

        if self.cpu.micro_position().is_none() && self.breakpoints.contains(&self.cpu.pc()) {
            self.running = false;
            self.status = format!("Breakpoint at address {}", self.cpu.pc());
            return;
        }

        self.step_instruction();
    }

    /// Toggle a breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.pc();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at {}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at {}", pc);
        }
    }

    /// Reload the program, cold-restarting the CPU.
    pub fn reset(&mut self) {
        self.cpu.load_program(self.program.clone());
        self.output.borrow_mut().take_output();
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Program listing rows: (address, text, is_current, has_breakpoint).
    pub fn listing(&self) -> Vec<(i32, &str, bool, bool)> {
        let pc = self.cpu.pc();
        self.cpu
            .instructions()
            .iter()
            .enumerate()
            .map(|(addr, text)| {
                let addr = addr as i32;
                (
                    addr,
                    text.as_str(),
                    addr == pc,
                    self.breakpoints.contains(&addr),
                )
            })
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<String>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(program);

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step_signal();
                        }
                        KeyCode::Char('n') => {
                            app.running = false;
                            app.step_instruction();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => {
                            app.mem_scroll = app.mem_scroll.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < app.cpu.memory().capacity() {
                                app.mem_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_instruction_stops_at_fetch_boundary() {
        let mut app = DebuggerApp::new(vec!["MOV_IMM R1 5".into(), "HLT".into()]);
        app.step_instruction();
        assert_eq!(app.cpu.registers().read("R1"), 5);
        assert!(app.cpu.micro_position().is_none());
        assert!(!app.cpu.is_halted());
    }

    #[test]
    fn reset_reloads_the_program() {
        let mut app = DebuggerApp::new(vec!["MOV_IMM R1 5".into(), "HLT".into()]);
        app.step_instruction();
        app.step_instruction();
        assert!(app.cpu.is_halted());

        app.reset();
        assert!(!app.cpu.is_halted());
        assert_eq!(app.cpu.pc(), 0);
        assert!(app.cpu.registers().is_empty());
    }

    #[test]
    fn breakpoint_pauses_continuous_run() {
        let mut app = DebuggerApp::new(vec![
            "MOV_IMM R1 1".into(),
            "MOV_IMM R2 2".into(),
            "HLT".into(),
        ]);
        app.breakpoints.insert(1);
        app.run();
        for _ in 0..100 {
            app.tick();
        }
        assert!(!app.running);
        assert_eq!(app.cpu.pc(), 1);
        assert!(!app.cpu.is_halted());
    }
}
