use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValveState {
    Closed,
    Open,
}

impl ValveState {
    pub const ALL: [ValveState; 2] = [ValveState::Closed, ValveState::Open];

    pub fn name(&self) -> &'static str {
        match self {
            ValveState::Closed => "closed",
            ValveState::Open => "open",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            ValveState::Closed => 0.0,
            ValveState::Open => 1.0,
        }
    }

    pub fn from_value(value: f64) -> Self {
        if value >= 0.5 {
            ValveState::Open
        } else {
            ValveState::Closed
        }
    }

    /// Parse the API's "open"/"close" command words.
    pub fn from_command(word: &str) -> Option<Self> {
        match word {
            "open" => Some(ValveState::Open),
            "close" => Some(ValveState::Closed),
            _ => None,
        }
    }
}

/// A controllable valve. `wants` is the requested state; `state` the actual
/// one, which may lag behind on slow hardware.
pub trait Valve: Send {
    fn state(&self) -> ValveState;
    fn wants(&self) -> ValveState;
    fn set_state(&mut self, state: ValveState);
}

/// Valve without an actuator; applies requests immediately.
pub struct ManualValve {
    state: ValveState,
}

impl ManualValve {
    pub fn new() -> Self {
        ManualValve { state: ValveState::Open }
    }
}

impl Default for ManualValve {
    fn default() -> Self {
        Self::new()
    }
}

impl Valve for ManualValve {
    fn state(&self) -> ValveState {
        self.state
    }

    fn wants(&self) -> ValveState {
        self.state
    }

    fn set_state(&mut self, state: ValveState) {
        if self.state == state {
            return; // nothing changes
        }
        self.state = state;
        info!("valve is now {}", state.name());
    }
}

/// The default deployment: two mains valves and five section valves.
pub fn default_valves() -> Vec<(String, Box<dyn Valve>)> {
    let mut valves: Vec<(String, Box<dyn Valve>)> = Vec::new();
    for i in 0..2 {
        valves.push((format!("bigvalve{}", i), Box::new(ManualValve::new())));
    }
    for i in 0..5 {
        valves.push((format!("valve{}", i), Box::new(ManualValve::new())));
    }
    valves
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        assert_eq!(ValveState::from_value(ValveState::Open.value()), ValveState::Open);
        assert_eq!(ValveState::from_value(ValveState::Closed.value()), ValveState::Closed);
        assert_eq!(ValveState::from_command("open"), Some(ValveState::Open));
        assert_eq!(ValveState::from_command("close"), Some(ValveState::Closed));
        assert_eq!(ValveState::from_command("ajar"), None);
    }

    #[test]
    fn test_manual_valve_applies_immediately() {
        let mut valve = ManualValve::new();
        assert_eq!(valve.state(), ValveState::Open);
        valve.set_state(ValveState::Closed);
        assert_eq!(valve.state(), ValveState::Closed);
        assert_eq!(valve.wants(), ValveState::Closed);
    }

    #[test]
    fn test_default_valve_names() {
        let valves = default_valves();
        assert_eq!(valves.len(), 7);
        assert_eq!(valves[0].0, "bigvalve0");
        assert_eq!(valves[2].0, "valve0");
    }
}
