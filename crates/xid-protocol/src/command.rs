//! XID command encoding
//!
//! Commands are two ASCII letters followed by a small fixed-width argument.
//! Queries carry a leading `_` and are answered with an echo of the query
//! followed by the value; set commands produce no reply.
//!
//! ```text
//! _f5          query trigger debounce   -> "_f5" <ms>
//! f5 <ms>      set trigger debounce
//! mp <u32 LE>  set pulse duration
//! mt <u32 LE> <u16 LE>  add pulse table entry
//! ```

use crate::baud::BaudRate;
use crate::EncodeCommand;

/// Every command the library sends to an XID device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XidCommand {
    GetOutputLogic,
    SetOutputLogic { mode: u8 },
    GetAccessoryConnectorMode,
    SetAccessoryConnectorMode { mode: u8 },
    GetAcDebounce,
    SetAcDebounce { ms: u8 },
    GetMpodModel { mpod: u8 },
    ConnectToMpod { mpod: u8, action: u8 },
    GetMappedSignals { line: u8 },
    MapSignals { line: u8, map: u32 },
    ResetMappedLines,
    CommitLineMapping,
    GetVoiceKeyDropDelay,
    SetVoiceKeyDropDelay { delay: u8 },

    GetProtocol,
    SetProtocol { protocol: u8 },
    GetCombinedInfo,
    GetInternalName,
    GetProductId,
    GetModelId,
    SetModelId { model: u8 },
    GetMajorVersion,
    GetMinorVersion,
    GetOutpostModel,
    GetHardwareGeneration,

    ResetBaseTimer,
    QueryBaseTimer,
    ResetRtTimer,
    QueryRtTimer,

    SetBaudRate { rate: BaudRate },
    GetLockingLevel,
    SetLockingLevel { level: u8 },
    ReprogramFlash,
    GetTriggerDefault,
    SetTriggerDefault { on: bool },
    GetTriggerDebounce,
    SetTriggerDebounce { ms: u8 },
    GetButtonDebounce,
    SetButtonDebounce { ms: u8 },
    RestoreFactoryDefaults,
    SaveSettings,

    GetTimerResetOnOnset { selector: u8 },
    SetTimerResetOnOnset { selector: u8, mode: u8 },
    GetTimestampedOutput { selector: u8 },
    SetTimestampedOutput { selector: u8, mode: u8 },
    GetAnalogThreshold { selector: u8 },
    SetAnalogThreshold { selector: u8, threshold: u8 },
    GetMpodOutputMode { selector: u8 },
    SetMpodOutputMode { selector: u8, mode: u8 },
    GetMixedInputMode,
    SetMixedInputMode { mode: u8 },
    GetSingleShotMode { selector: u8 },
    SetSingleShotMode { selector: u8, mode: SingleShotMode },
    GetSignalFilter { selector: u8 },
    SetSignalFilter { selector: u8, filter: SignalFilter },
    GetEnableUsbOutput { selector: u8 },
    SetEnableUsbOutput { selector: u8, mode: u8 },

    GetLightSensorMode,
    SetLightSensorMode { mode: u8 },
    GetLightSensorThreshold,
    SetLightSensorThreshold { threshold: u8 },
    SetScannerTriggerFilter { mode: u8 },

    GetNumberOfLines,
    SetNumberOfLines { lines: u8 },
    GetPulseDuration,
    SetPulseDuration { ms: u32 },
    /// One-byte output lines (`ah`): XID2 response pads, Lumina and SV-1
    SetLinesByte { lines: u8 },
    /// Two-byte output lines (`mh`): StimTracker and everything else
    SetLinesWord { lines: u16 },

    GetPulseTableBitmask,
    SetPulseTableBitmask { lines: u16 },
    ClearPulseTable,
    IsPulseTableRunning,
    RunPulseTable,
    StopPulseTable,
    AddPulseTableEntry { offset_ms: u32, lines: u16 },
    ResetOutputLines,
}

/// Single-shot setting of one input (`ia`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SingleShotMode {
    pub enabled: bool,
    /// Milliseconds the input stays blocked after firing
    pub delay: u32,
}

/// Hold-on and hold-off times of one input (`if`), in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalFilter {
    pub hold_on: u32,
    pub hold_off: u32,
}

/// ASCII digit for a small numeric argument (wraps past `'9'` instead of overflowing)
fn digit(value: u8) -> u8 {
    b'0'.wrapping_add(value)
}

/// Character used on the wire for a signal-mapping line (0-9, then A-F)
pub fn line_char(line: u8) -> u8 {
    if line > 9 {
        b'7'.wrapping_add(line)
    } else {
        digit(line)
    }
}

fn with_le32(prefix: &[u8], value: u32) -> Vec<u8> {
    let mut out = prefix.to_vec();
    out.extend_from_slice(&value.to_le_bytes());
    out
}

impl XidCommand {
    /// Length of the reply this command produces (0 for set commands)
    pub fn reply_len(&self) -> usize {
        match self {
            XidCommand::GetProductId
            | XidCommand::GetModelId
            | XidCommand::GetMajorVersion
            | XidCommand::GetMinorVersion
            | XidCommand::GetOutpostModel
            | XidCommand::GetHardwareGeneration => 1,
            XidCommand::GetOutputLogic
            | XidCommand::GetAccessoryConnectorMode
            | XidCommand::GetAcDebounce
            | XidCommand::GetVoiceKeyDropDelay
            | XidCommand::GetLockingLevel
            | XidCommand::GetTriggerDefault
            | XidCommand::GetTriggerDebounce
            | XidCommand::GetButtonDebounce
            | XidCommand::GetMixedInputMode
            | XidCommand::GetLightSensorMode
            | XidCommand::GetLightSensorThreshold
            | XidCommand::GetNumberOfLines
            | XidCommand::IsPulseTableRunning => 4,
            XidCommand::GetProtocol
            | XidCommand::GetMpodModel { .. }
            | XidCommand::GetTimerResetOnOnset { .. }
            | XidCommand::GetTimestampedOutput { .. }
            | XidCommand::GetAnalogThreshold { .. }
            | XidCommand::GetMpodOutputMode { .. }
            | XidCommand::GetEnableUsbOutput { .. }
            | XidCommand::GetPulseTableBitmask => 5,
            XidCommand::QueryBaseTimer => 6,
            XidCommand::GetPulseDuration | XidCommand::QueryRtTimer => 7,
            XidCommand::GetSingleShotMode { .. } => 9,
            XidCommand::GetMappedSignals { .. } | XidCommand::GetSignalFilter { .. } => 12,
            // Set commands, plus the free-form text queries (_d0, _d1)
            // which are read until the device goes quiet
            _ => 0,
        }
    }

    /// Whether a reply is expected at all
    pub fn is_query(&self) -> bool {
        self.reply_len() > 0
            || matches!(
                self,
                XidCommand::GetCombinedInfo | XidCommand::GetInternalName
            )
    }

    /// Echo prefix the reply starts with, if any
    pub fn reply_prefix(&self) -> Option<&'static [u8]> {
        match self {
            XidCommand::GetOutputLogic => Some(b"_a0"),
            XidCommand::GetAccessoryConnectorMode => Some(b"_a1"),
            XidCommand::GetAcDebounce => Some(b"_a6"),
            XidCommand::GetMpodModel { .. } => Some(b"_aq"),
            XidCommand::GetMappedSignals { .. } => Some(b"_at"),
            XidCommand::GetVoiceKeyDropDelay => Some(b"_b3"),
            XidCommand::GetProtocol => Some(b"_xid"),
            XidCommand::QueryBaseTimer => Some(b"e3"),
            XidCommand::QueryRtTimer => Some(b"_e5"),
            XidCommand::GetLockingLevel => Some(b"_f2"),
            XidCommand::GetTriggerDefault => Some(b"_f4"),
            XidCommand::GetTriggerDebounce => Some(b"_f5"),
            XidCommand::GetButtonDebounce => Some(b"_f6"),
            XidCommand::GetTimerResetOnOnset { .. } => Some(b"_ir"),
            XidCommand::GetTimestampedOutput { .. } => Some(b"_io"),
            XidCommand::GetAnalogThreshold { .. } => Some(b"_it"),
            XidCommand::GetMpodOutputMode { .. } => Some(b"_im"),
            XidCommand::GetMixedInputMode => Some(b"_iv"),
            XidCommand::GetSingleShotMode { .. } => Some(b"_ia"),
            XidCommand::GetSignalFilter { .. } => Some(b"_if"),
            XidCommand::GetEnableUsbOutput { .. } => Some(b"_iu"),
            XidCommand::GetLightSensorMode => Some(b"_lr"),
            XidCommand::GetLightSensorThreshold => Some(b"_lt"),
            XidCommand::GetNumberOfLines => Some(b"_ml"),
            XidCommand::GetPulseDuration => Some(b"_mp"),
            XidCommand::GetPulseTableBitmask => Some(b"_mk"),
            XidCommand::IsPulseTableRunning => Some(b"_mr"),
            _ => None,
        }
    }

    /// Short human-readable name, used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            XidCommand::GetOutputLogic | XidCommand::SetOutputLogic { .. } => "output logic",
            XidCommand::GetAccessoryConnectorMode | XidCommand::SetAccessoryConnectorMode { .. } => {
                "accessory connector mode"
            }
            XidCommand::GetAcDebounce | XidCommand::SetAcDebounce { .. } => "AC debounce",
            XidCommand::GetMpodModel { .. } => "m-pod model",
            XidCommand::ConnectToMpod { .. } => "connect to m-pod",
            XidCommand::GetMappedSignals { .. } | XidCommand::MapSignals { .. } => {
                "signal mapping"
            }
            XidCommand::ResetMappedLines => "reset signal mapping",
            XidCommand::CommitLineMapping => "commit signal mapping",
            XidCommand::GetVoiceKeyDropDelay | XidCommand::SetVoiceKeyDropDelay { .. } => {
                "voice key drop delay"
            }
            XidCommand::GetProtocol | XidCommand::SetProtocol { .. } => "protocol",
            XidCommand::GetCombinedInfo => "combined info",
            XidCommand::GetInternalName => "internal product name",
            XidCommand::GetProductId => "product id",
            XidCommand::GetModelId | XidCommand::SetModelId { .. } => "model id",
            XidCommand::GetMajorVersion => "major firmware version",
            XidCommand::GetMinorVersion => "minor firmware version",
            XidCommand::GetOutpostModel => "outpost model",
            XidCommand::GetHardwareGeneration => "hardware generation",
            XidCommand::ResetBaseTimer => "reset base timer",
            XidCommand::QueryBaseTimer => "base timer",
            XidCommand::ResetRtTimer => "reset RT timer",
            XidCommand::QueryRtTimer => "RT timer",
            XidCommand::SetBaudRate { .. } => "baud rate",
            XidCommand::GetLockingLevel | XidCommand::SetLockingLevel { .. } => "locking level",
            XidCommand::ReprogramFlash => "reprogram flash",
            XidCommand::GetTriggerDefault | XidCommand::SetTriggerDefault { .. } => {
                "trigger default"
            }
            XidCommand::GetTriggerDebounce | XidCommand::SetTriggerDebounce { .. } => {
                "trigger debounce"
            }
            XidCommand::GetButtonDebounce | XidCommand::SetButtonDebounce { .. } => {
                "button debounce"
            }
            XidCommand::RestoreFactoryDefaults => "restore factory defaults",
            XidCommand::SaveSettings => "save settings",
            XidCommand::GetTimerResetOnOnset { .. } | XidCommand::SetTimerResetOnOnset { .. } => {
                "timer reset on onset"
            }
            XidCommand::GetTimestampedOutput { .. } | XidCommand::SetTimestampedOutput { .. } => {
                "timestamped output"
            }
            XidCommand::GetAnalogThreshold { .. } | XidCommand::SetAnalogThreshold { .. } => {
                "analog input threshold"
            }
            XidCommand::GetMpodOutputMode { .. } | XidCommand::SetMpodOutputMode { .. } => {
                "m-pod output mode"
            }
            XidCommand::GetMixedInputMode | XidCommand::SetMixedInputMode { .. } => {
                "mixed input mode"
            }
            XidCommand::GetSingleShotMode { .. } | XidCommand::SetSingleShotMode { .. } => {
                "single-shot mode"
            }
            XidCommand::GetSignalFilter { .. } | XidCommand::SetSignalFilter { .. } => {
                "signal filter"
            }
            XidCommand::GetEnableUsbOutput { .. } | XidCommand::SetEnableUsbOutput { .. } => {
                "USB output"
            }
            XidCommand::GetLightSensorMode | XidCommand::SetLightSensorMode { .. } => {
                "light sensor mode"
            }
            XidCommand::GetLightSensorThreshold | XidCommand::SetLightSensorThreshold { .. } => {
                "light sensor threshold"
            }
            XidCommand::SetScannerTriggerFilter { .. } => "scanner trigger filter",
            XidCommand::GetNumberOfLines | XidCommand::SetNumberOfLines { .. } => {
                "number of lines"
            }
            XidCommand::GetPulseDuration | XidCommand::SetPulseDuration { .. } => {
                "pulse duration"
            }
            XidCommand::SetLinesByte { .. } | XidCommand::SetLinesWord { .. } => "output lines",
            XidCommand::GetPulseTableBitmask | XidCommand::SetPulseTableBitmask { .. } => {
                "pulse table bitmask"
            }
            XidCommand::ClearPulseTable => "clear pulse table",
            XidCommand::IsPulseTableRunning => "pulse table running",
            XidCommand::RunPulseTable => "run pulse table",
            XidCommand::StopPulseTable => "stop pulse table",
            XidCommand::AddPulseTableEntry { .. } => "pulse table entry",
            XidCommand::ResetOutputLines => "reset output lines",
        }
    }
}

impl EncodeCommand for XidCommand {
    fn encode(&self) -> Vec<u8> {
        match *self {
            XidCommand::GetOutputLogic => b"_a0".to_vec(),
            XidCommand::SetOutputLogic { mode } => vec![b'a', b'0', digit(mode)],
            XidCommand::GetAccessoryConnectorMode => b"_a1".to_vec(),
            XidCommand::SetAccessoryConnectorMode { mode } => vec![b'a', b'1', digit(mode)],
            XidCommand::GetAcDebounce => b"_a6".to_vec(),
            XidCommand::SetAcDebounce { ms } => vec![b'a', b'6', ms],
            XidCommand::GetMpodModel { mpod } => vec![b'_', b'a', b'q', digit(mpod)],
            XidCommand::ConnectToMpod { mpod, action } => {
                vec![b'a', b'q', digit(mpod), digit(action)]
            }
            XidCommand::GetMappedSignals { line } => vec![b'_', b'a', b't', line_char(line)],
            XidCommand::MapSignals { line, map } => {
                let mut out = vec![b'a', b't', line_char(line)];
                out.extend_from_slice(format!("{:08X}", map).as_bytes());
                out
            }
            XidCommand::ResetMappedLines => b"atX".to_vec(),
            XidCommand::CommitLineMapping => b"af".to_vec(),
            XidCommand::GetVoiceKeyDropDelay => b"_b3".to_vec(),
            XidCommand::SetVoiceKeyDropDelay { delay } => vec![b'b', b'3', delay],

            XidCommand::GetProtocol => b"_c1".to_vec(),
            XidCommand::SetProtocol { protocol } => vec![b'c', b'1', digit(protocol)],
            XidCommand::GetCombinedInfo => b"_d0".to_vec(),
            XidCommand::GetInternalName => b"_d1".to_vec(),
            XidCommand::GetProductId => b"_d2".to_vec(),
            XidCommand::GetModelId => b"_d3".to_vec(),
            XidCommand::SetModelId { model } => vec![b'd', b'3', model],
            XidCommand::GetMajorVersion => b"_d4".to_vec(),
            XidCommand::GetMinorVersion => b"_d5".to_vec(),
            XidCommand::GetOutpostModel => b"_d6".to_vec(),
            XidCommand::GetHardwareGeneration => b"_d7".to_vec(),

            XidCommand::ResetBaseTimer => b"e1".to_vec(),
            XidCommand::QueryBaseTimer => b"e3".to_vec(),
            XidCommand::ResetRtTimer => b"e5".to_vec(),
            XidCommand::QueryRtTimer => b"_e5".to_vec(),

            XidCommand::SetBaudRate { rate } => vec![b'f', b'1', rate.selector()],
            XidCommand::GetLockingLevel => b"_f2".to_vec(),
            XidCommand::SetLockingLevel { level } => vec![b'f', b'2', level],
            XidCommand::ReprogramFlash => b"f3".to_vec(),
            XidCommand::GetTriggerDefault => b"_f4".to_vec(),
            XidCommand::SetTriggerDefault { on } => vec![b'f', b'4', digit(on as u8)],
            XidCommand::GetTriggerDebounce => b"_f5".to_vec(),
            XidCommand::SetTriggerDebounce { ms } => vec![b'f', b'5', ms],
            XidCommand::GetButtonDebounce => b"_f6".to_vec(),
            XidCommand::SetButtonDebounce { ms } => vec![b'f', b'6', ms],
            XidCommand::RestoreFactoryDefaults => b"f7".to_vec(),
            XidCommand::SaveSettings => b"f9".to_vec(),

            XidCommand::GetTimerResetOnOnset { selector } => vec![b'_', b'i', b'r', selector],
            XidCommand::SetTimerResetOnOnset { selector, mode } => {
                vec![b'i', b'r', selector, digit(mode)]
            }
            XidCommand::GetTimestampedOutput { selector } => vec![b'_', b'i', b'o', selector],
            XidCommand::SetTimestampedOutput { selector, mode } => {
                vec![b'i', b'o', selector, digit(mode)]
            }
            XidCommand::GetAnalogThreshold { selector } => vec![b'_', b'i', b't', selector],
            XidCommand::SetAnalogThreshold {
                selector,
                threshold,
            } => vec![b'i', b't', selector, threshold],
            XidCommand::GetMpodOutputMode { selector } => vec![b'_', b'i', b'm', selector],
            XidCommand::SetMpodOutputMode { selector, mode } => {
                vec![b'i', b'm', selector, digit(mode)]
            }
            XidCommand::GetMixedInputMode => b"_iv".to_vec(),
            XidCommand::SetMixedInputMode { mode } => vec![b'i', b'v', digit(mode)],
            XidCommand::GetSingleShotMode { selector } => vec![b'_', b'i', b'a', selector],
            XidCommand::SetSingleShotMode { selector, mode } => {
                let mut out = vec![b'i', b'a', selector, digit(mode.enabled as u8)];
                out.extend_from_slice(&mode.delay.to_le_bytes());
                out
            }
            XidCommand::GetSignalFilter { selector } => vec![b'_', b'i', b'f', selector],
            XidCommand::SetSignalFilter { selector, filter } => {
                let mut out = vec![b'i', b'f', selector];
                out.extend_from_slice(&filter.hold_on.to_le_bytes());
                out.extend_from_slice(&filter.hold_off.to_le_bytes());
                out
            }
            XidCommand::GetEnableUsbOutput { selector } => vec![b'_', b'i', b'u', selector],
            XidCommand::SetEnableUsbOutput { selector, mode } => {
                vec![b'i', b'u', selector, digit(mode)]
            }

            XidCommand::GetLightSensorMode => b"_lr".to_vec(),
            XidCommand::SetLightSensorMode { mode } => vec![b'l', b'r', digit(mode)],
            XidCommand::GetLightSensorThreshold => b"_lt".to_vec(),
            XidCommand::SetLightSensorThreshold { threshold } => vec![b'l', b't', threshold],
            XidCommand::SetScannerTriggerFilter { mode } => vec![b't', b's', digit(mode)],

            XidCommand::GetNumberOfLines => b"_ml".to_vec(),
            XidCommand::SetNumberOfLines { lines } => vec![b'm', b'l', lines],
            XidCommand::GetPulseDuration => b"_mp".to_vec(),
            XidCommand::SetPulseDuration { ms } => with_le32(b"mp", ms),
            XidCommand::SetLinesByte { lines } => vec![b'a', b'h', lines],
            XidCommand::SetLinesWord { lines } => {
                let [lo, hi] = lines.to_le_bytes();
                vec![b'm', b'h', lo, hi]
            }

            XidCommand::GetPulseTableBitmask => b"_mk".to_vec(),
            XidCommand::SetPulseTableBitmask { lines } => {
                let [lo, hi] = lines.to_le_bytes();
                vec![b'm', b'k', lo, hi]
            }
            XidCommand::ClearPulseTable => b"mc".to_vec(),
            XidCommand::IsPulseTableRunning => b"_mr".to_vec(),
            XidCommand::RunPulseTable => b"mr".to_vec(),
            XidCommand::StopPulseTable => b"ms".to_vec(),
            XidCommand::AddPulseTableEntry { offset_ms, lines } => {
                let mut out = with_le32(b"mt", offset_ms);
                out.extend_from_slice(&lines.to_le_bytes());
                out
            }
            XidCommand::ResetOutputLines => b"mz".to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identification_queries() {
        assert_eq!(XidCommand::GetProtocol.encode(), b"_c1");
        assert_eq!(XidCommand::GetProductId.encode(), b"_d2");
        assert_eq!(XidCommand::GetModelId.encode(), b"_d3");
        assert_eq!(XidCommand::GetMajorVersion.encode(), b"_d4");
        assert_eq!(XidCommand::GetProductId.reply_len(), 1);
    }

    #[test]
    fn test_ascii_digit_arguments() {
        assert_eq!(
            XidCommand::SetAccessoryConnectorMode { mode: 3 }.encode(),
            b"a13"
        );
        assert_eq!(XidCommand::SetProtocol { protocol: 0 }.encode(), b"c10");
        assert_eq!(XidCommand::SetTriggerDefault { on: true }.encode(), b"f41");
        assert_eq!(XidCommand::SetLightSensorMode { mode: 2 }.encode(), b"lr2");
    }

    #[test]
    fn test_raw_byte_arguments() {
        assert_eq!(
            XidCommand::SetTriggerDebounce { ms: 200 }.encode(),
            vec![b'f', b'5', 200]
        );
        assert_eq!(
            XidCommand::SetLightSensorThreshold { threshold: 0x80 }.encode(),
            vec![b'l', b't', 0x80]
        );
    }

    #[test]
    fn test_baud_rate_uses_selector() {
        assert_eq!(
            XidCommand::SetBaudRate {
                rate: BaudRate::B19200
            }
            .encode(),
            vec![b'f', b'1', 1]
        );
    }

    #[test]
    fn test_pulse_duration_little_endian() {
        assert_eq!(
            XidCommand::SetPulseDuration { ms: 0x0102_0304 }.encode(),
            vec![b'm', b'p', 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn test_lines_commands() {
        assert_eq!(
            XidCommand::SetLinesByte { lines: 0xA5 }.encode(),
            vec![b'a', b'h', 0xA5]
        );
        assert_eq!(
            XidCommand::SetLinesWord { lines: 0x1234 }.encode(),
            vec![b'm', b'h', 0x34, 0x12]
        );
    }

    #[test]
    fn test_pulse_table_entry() {
        assert_eq!(
            XidCommand::AddPulseTableEntry {
                offset_ms: 500,
                lines: 0x02
            }
            .encode(),
            vec![b'm', b't', 0xF4, 0x01, 0x00, 0x00, 0x02, 0x00]
        );
    }

    #[test]
    fn test_signal_mapping_line_chars() {
        assert_eq!(line_char(0), b'0');
        assert_eq!(line_char(9), b'9');
        assert_eq!(line_char(10), b'A');
        assert_eq!(line_char(15), b'F');
        assert_eq!(
            XidCommand::MapSignals {
                line: 11,
                map: 0xbeef
            }
            .encode(),
            b"atB0000BEEF"
        );
        assert_eq!(XidCommand::GetMappedSignals { line: 3 }.encode(), b"_at3");
    }

    #[test]
    fn test_mpod_commands() {
        assert_eq!(XidCommand::GetMpodModel { mpod: 1 }.encode(), b"_aq1");
        assert_eq!(
            XidCommand::ConnectToMpod { mpod: 1, action: 1 }.encode(),
            b"aq11"
        );
    }

    #[test]
    fn test_reply_prefixes_match_queries() {
        let queries = [
            XidCommand::GetAccessoryConnectorMode,
            XidCommand::GetTriggerDebounce,
            XidCommand::GetPulseDuration,
            XidCommand::GetLightSensorMode,
            XidCommand::IsPulseTableRunning,
            XidCommand::QueryRtTimer,
            XidCommand::GetSingleShotMode { selector: b'A' },
            XidCommand::GetSignalFilter { selector: b'A' },
            XidCommand::GetEnableUsbOutput { selector: b'A' },
        ];
        for q in queries {
            let encoded = q.encode();
            let prefix = q.reply_prefix().unwrap();
            assert_eq!(&encoded[..prefix.len()], prefix, "{}", q.name());
            assert!(q.reply_len() > prefix.len());
        }
    }

    #[test]
    fn test_input_register_commands() {
        let a = b'A';
        assert_eq!(
            XidCommand::SetSingleShotMode {
                selector: a,
                mode: SingleShotMode {
                    enabled: true,
                    delay: 300
                }
            }
            .encode(),
            vec![b'i', b'a', a, b'1', 0x2C, 0x01, 0x00, 0x00]
        );
        assert_eq!(
            XidCommand::SetSignalFilter {
                selector: a,
                filter: SignalFilter {
                    hold_on: 2,
                    hold_off: 0x0100
                }
            }
            .encode(),
            vec![b'i', b'f', a, 2, 0, 0, 0, 0x00, 0x01, 0, 0]
        );
        assert_eq!(
            XidCommand::SetEnableUsbOutput { selector: a, mode: 1 }.encode(),
            b"iuA1"
        );
        assert_eq!(XidCommand::GetSignalFilter { selector: a }.encode(), b"_ifA");
        assert_eq!(XidCommand::QueryRtTimer.encode(), b"_e5");
        assert_eq!(XidCommand::GetSingleShotMode { selector: a }.reply_len(), 9);
        assert_eq!(XidCommand::GetSignalFilter { selector: a }.reply_len(), 12);
    }

    #[test]
    fn test_oversized_digit_argument_wraps() {
        assert_eq!(
            XidCommand::SetProtocol { protocol: 250 }.encode(),
            vec![b'c', b'1', b'0'.wrapping_add(250)]
        );
        assert_eq!(
            XidCommand::ConnectToMpod { mpod: 255, action: 1 }.encode(),
            vec![b'a', b'q', b'/', b'1']
        );
    }

    #[test]
    fn test_set_commands_have_no_reply() {
        assert!(!XidCommand::RestoreFactoryDefaults.is_query());
        assert!(!XidCommand::SetLinesByte { lines: 1 }.is_query());
        assert!(XidCommand::GetInternalName.is_query());
        assert!(XidCommand::QueryBaseTimer.is_query());
    }
}
