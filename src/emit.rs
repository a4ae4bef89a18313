/// Jasmin assembly emitter: an append-only sequence of instruction lines
/// plus `last_index`, the counter that disambiguates branch labels
/// (`else_N`, `endif_N`, `while_N`, `done_N`, `repeat_N`). The semantic
/// walk captures the counter on entry to each labelled construct and
/// increments it exactly once per construct; labels are resolved textually
/// by the assembler, never by us.
pub struct Emitter {
    lines: Vec<String>,
    pub last_index: u32,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            last_index: 0,
        }
    }

    pub fn add(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
