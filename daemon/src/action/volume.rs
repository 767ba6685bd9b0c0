//! System volume control through platform commands

use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::ActionError;

/// Performs the triggered side effect
pub trait ActionSink {
    fn trigger(&self) -> Result<(), ActionError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Platform mechanism used to raise the volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeBackend {
    /// Windows: send the media "volume up" key through PowerShell
    PowerShell,
    /// macOS: AppleScript via `osascript`
    Osascript,
    /// Linux: ALSA mixer routed to PulseAudio
    Amixer,
    /// Linux: PulseAudio control
    Pactl,
}

impl std::fmt::Display for VolumeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeBackend::PowerShell => write!(f, "powershell"),
            VolumeBackend::Osascript => write!(f, "osascript"),
            VolumeBackend::Amixer => write!(f, "amixer"),
            VolumeBackend::Pactl => write!(f, "pactl"),
        }
    }
}

impl VolumeBackend {
    fn program(&self) -> &'static str {
        match self {
            VolumeBackend::PowerShell => "powershell",
            VolumeBackend::Osascript => "osascript",
            VolumeBackend::Amixer => "amixer",
            VolumeBackend::Pactl => "pactl",
        }
    }

    /// Arguments that raise the volume by `step` percent
    fn args(&self, step: u8) -> Vec<String> {
        match self {
            // VK_VOLUME_UP; each press is one system step regardless of `step`
            VolumeBackend::PowerShell => vec![
                "-NoProfile".to_string(),
                "-Command".to_string(),
                "(New-Object -ComObject WScript.Shell).SendKeys([char]175)".to_string(),
            ],
            VolumeBackend::Osascript => vec![
                "-e".to_string(),
                format!(
                    "set volume output volume ((output volume of (get volume settings)) + {step})"
                ),
            ],
            VolumeBackend::Amixer => vec![
                "-D".to_string(),
                "pulse".to_string(),
                "sset".to_string(),
                "Master".to_string(),
                format!("{step}%+"),
            ],
            VolumeBackend::Pactl => vec![
                "set-sink-volume".to_string(),
                "@DEFAULT_SINK@".to_string(),
                format!("+{step}%"),
            ],
        }
    }

    /// Arguments for a harmless availability probe
    fn probe_args(&self) -> &'static [&'static str] {
        match self {
            VolumeBackend::PowerShell => &["-NoProfile", "-Command", "exit 0"],
            VolumeBackend::Osascript => &["-e", "return"],
            VolumeBackend::Amixer => &["-D", "pulse", "sget", "Master"],
            VolumeBackend::Pactl => &["info"],
        }
    }

    /// Candidate backends for the current platform, in preference order
    pub fn candidates() -> &'static [VolumeBackend] {
        if cfg!(target_os = "windows") {
            &[VolumeBackend::PowerShell]
        } else if cfg!(target_os = "macos") {
            &[VolumeBackend::Osascript]
        } else if cfg!(target_os = "linux") {
            &[VolumeBackend::Amixer, VolumeBackend::Pactl]
        } else {
            &[]
        }
    }
}

/// Raises the system volume with one fixed backend
#[derive(Debug, Clone)]
pub struct VolumeControl {
    backend: VolumeBackend,
    step: u8,
    name: String,
}

impl VolumeControl {
    pub fn new(backend: VolumeBackend, step: u8) -> Self {
        Self {
            backend,
            step,
            name: format!("volume:{backend}"),
        }
    }

    /// Pick the first backend on this platform whose probe succeeds
    pub fn detect(step: u8) -> Result<Self, ActionError> {
        Self::detect_with(step, VolumeBackend::candidates(), probe)
    }

    fn detect_with<P>(
        step: u8,
        candidates: &[VolumeBackend],
        probe: P,
    ) -> Result<Self, ActionError>
    where
        P: Fn(VolumeBackend) -> bool,
    {
        for &backend in candidates {
            if probe(backend) {
                info!(%backend, step, "volume backend selected");
                return Ok(Self::new(backend, step));
            }
            debug!(%backend, "volume backend unavailable");
        }

        Err(ActionError::Unavailable(format!(
            "tried [{}]",
            candidates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Preferred backend for this platform without probing
    pub fn fallback(step: u8) -> Option<Self> {
        VolumeBackend::candidates()
            .first()
            .map(|&backend| Self::new(backend, step))
    }

    pub fn backend(&self) -> VolumeBackend {
        self.backend
    }
}

fn probe(backend: VolumeBackend) -> bool {
    Command::new(backend.program())
        .args(backend.probe_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

impl ActionSink for VolumeControl {
    fn trigger(&self) -> Result<(), ActionError> {
        let program = self.backend.program();
        let output = Command::new(program)
            .args(self.backend.args(self.step))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ActionError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ActionError::Failed {
                program: program.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(backend = %self.backend, step = self.step, "volume raised");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_picks_first_available() {
        let candidates = [VolumeBackend::Amixer, VolumeBackend::Pactl];
        let control =
            VolumeControl::detect_with(5, &candidates, |b| b == VolumeBackend::Pactl).unwrap();
        assert_eq!(control.backend(), VolumeBackend::Pactl);
        assert_eq!(control.name(), "volume:pactl");

        let control = VolumeControl::detect_with(5, &candidates, |_| true).unwrap();
        assert_eq!(control.backend(), VolumeBackend::Amixer);
    }

    #[test]
    fn test_detect_none_available() {
        let candidates = [VolumeBackend::Amixer, VolumeBackend::Pactl];
        let err = VolumeControl::detect_with(5, &candidates, |_| false).unwrap_err();
        assert!(matches!(err, ActionError::Unavailable(msg) if msg.contains("pactl")));
    }

    #[test]
    fn test_step_in_arguments() {
        assert_eq!(
            VolumeBackend::Pactl.args(5),
            vec!["set-sink-volume", "@DEFAULT_SINK@", "+5%"]
        );
        assert!(VolumeBackend::Amixer.args(10).contains(&"10%+".to_string()));
        assert!(VolumeBackend::Osascript.args(10)[1].ends_with("+ 10)"));
    }

    #[test]
    fn test_fallback_uses_preferred_backend() {
        match VolumeControl::fallback(5) {
            Some(control) => assert_eq!(control.backend(), VolumeBackend::candidates()[0]),
            None => assert!(VolumeBackend::candidates().is_empty()),
        }
    }
}
