use serde::Serialize;

const GREEN: &str = "#4ade80";
const AMBER: &str = "#fbbf24";
const RED: &str = "#ef4444";

/// Toolbar badge summarising session energy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub text: String,
    /// `None` when the badge is hidden.
    pub color: Option<String>,
}

impl Badge {
    pub fn for_session_energy(energy_wh: f64) -> Self {
        let (text, color) = if energy_wh < 1.0 {
            (String::new(), None)
        } else if energy_wh < 10.0 {
            (format!("{energy_wh:.1}"), Some(GREEN))
        } else if energy_wh < 50.0 {
            (format!("{}", energy_wh.floor() as u64), Some(AMBER))
        } else {
            ("50+".to_string(), Some(RED))
        };

        Self {
            text,
            color: color.map(str::to_string),
        }
    }
}
