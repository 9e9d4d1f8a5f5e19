//! Descriptions of Grbl alarm codes.

/// Short title and operator guidance for an alarm code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmInfo {
    pub code: u16,
    pub title: &'static str,
    pub description: &'static str,
}

const ALARMS: &[AlarmInfo] = &[
    AlarmInfo {
        code: 1,
        title: "Hard limit",
        description: "Hard limit has been triggered. Machine position is likely lost due to sudden halt. Re-homing is highly recommended.",
    },
    AlarmInfo {
        code: 2,
        title: "Soft limit",
        description: "Soft limit alarm. G-code motion target exceeds machine travel. Machine position retained. Alarm may be safely unlocked.",
    },
    AlarmInfo {
        code: 3,
        title: "Abort during cycle",
        description: "Reset while in motion. Machine position is likely lost due to sudden halt. Re-homing is highly recommended.",
    },
    AlarmInfo {
        code: 4,
        title: "Probe fail",
        description: "Probe fail. Probe is not in the expected initial state before starting probe cycle when G38.2 and G38.3 is not triggered and G38.4 and G38.5 is triggered.",
    },
    AlarmInfo {
        code: 5,
        title: "Probe fail",
        description: "Probe fail. Probe did not contact the workpiece within the programmed travel for G38.2 and G38.4.",
    },
    AlarmInfo {
        code: 6,
        title: "Homing fail",
        description: "Homing fail. The active homing cycle was reset.",
    },
    AlarmInfo {
        code: 7,
        title: "Homing fail",
        description: "Homing fail. Safety door was opened during homing cycle.",
    },
    AlarmInfo {
        code: 8,
        title: "Homing fail",
        description: "Homing fail. Pull off travel failed to clear limit switch. Try increasing pull-off setting or check wiring.",
    },
    AlarmInfo {
        code: 9,
        title: "Homing fail",
        description: "Homing fail. Could not find limit switch within search distances. Try increasing max travel, decreasing pull-off distance, or check wiring.",
    },
];

/// Look up an alarm code.
pub fn alarm_info(code: u16) -> Option<&'static AlarmInfo> {
    ALARMS.iter().find(|info| info.code == code)
}
