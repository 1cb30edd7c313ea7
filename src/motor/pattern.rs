// Output line patterns for the dual H-bridge
// Each driver has a low/high input pair; driving one side high turns its motor.

/// Logical level of one output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    /// Value written to a sysfs `value` file
    pub fn as_sysfs(self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }
}

/// Levels for all four lines, ordered [A-low, A-high, B-low, B-high]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinePattern(pub [Level; 4]);

const L: Level = Level::Low;
const H: Level = Level::High;

impl LinePattern {
    pub const FORWARD: LinePattern = LinePattern([L, H, L, H]);
    pub const BACKWARD: LinePattern = LinePattern([H, L, H, L]);
    pub const TURN_RIGHT: LinePattern = LinePattern([L, H, L, L]);
    pub const TURN_LEFT: LinePattern = LinePattern([L, L, L, H]);
    pub const STOP: LinePattern = LinePattern([L, L, L, L]);

    pub fn levels(&self) -> [Level; 4] {
        self.0
    }

    /// Both inputs of one driver high would short the bridge leg
    pub fn is_conflicting(&self) -> bool {
        let [a_low, a_high, b_low, b_high] = self.0;
        (a_low == H && a_high == H) || (b_low == H && b_high == H)
    }

    /// Line writes taking the bridge from `from` to `self`, as (index, level).
    ///
    /// Lines going low are written before lines going high, so no intermediate
    /// state drives both inputs of a driver. An unknown `from` rewrites every line.
    pub fn writes_from(&self, from: Option<LinePattern>) -> Vec<(usize, Level)> {
        let mut writes: Vec<(usize, Level)> = (0..4)
            .filter(|&i| from.is_none_or(|from| from.0[i] != self.0[i]))
            .map(|i| (i, self.0[i]))
            .collect();
        writes.sort_by_key(|&(_, level)| level == H);
        writes
    }

    /// Compact form used in logs, e.g. `0101`
    pub fn bits(&self) -> String {
        self.0.iter().map(|level| level.as_sysfs()).collect()
    }
}
