/*!
 * Alarm levels requested by the platform.
 *
 * The platform raises alarms by severity name; the local indicator (lights,
 * buzzer) only distinguishes a few levels. The latest level is published on
 * a watch channel for whatever drives the indicator.
 */
use std::fmt;

/// Level shown by the local alarm indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmState {
    /// No alarm
    #[default]
    Off,
    /// Urgent attention needed
    High,
    /// Attention needed
    Medium,
}

impl AlarmState {
    /// Map a platform severity to an indicator level
    ///
    /// Critical and major alarms are high, minor alarms are medium, and
    /// anything else (including a missing severity) clears the alarm.
    pub fn from_severity(severity: Option<&str>) -> Self {
        match severity.map(str::to_ascii_lowercase).as_deref() {
            Some("critical") | Some("major") => AlarmState::High,
            Some("minor") => AlarmState::Medium,
            _ => AlarmState::Off,
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmState::Off => write!(f, "off"),
            AlarmState::High => write!(f, "high"),
            AlarmState::Medium => write!(f, "medium"),
        }
    }
}
