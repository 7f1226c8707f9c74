//! Audio devices and webcams listed in the settings file

use super::DeviceList;
use crate::config::Config;

/// Device names are whatever the platform's ffmpeg input expects
/// (PulseAudio source names, DirectShow device names, ...).
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDevices {
    microphones: Vec<String>,
    speakers: Vec<String>,
    webcams: Vec<String>,
}

impl ConfiguredDevices {
    pub fn from_config(config: &Config) -> Self {
        let mut webcams = vec!["No Webcam".to_string()];
        webcams.extend(config.webcam.cameras.iter().cloned());

        Self {
            microphones: config.audio.microphones.clone(),
            speakers: config.audio.speakers.clone(),
            webcams,
        }
    }
}

impl DeviceList for ConfiguredDevices {
    fn microphones(&self) -> Vec<String> {
        self.microphones.clone()
    }

    fn speakers(&self) -> Vec<String> {
        self.speakers.clone()
    }

    fn webcams(&self) -> Vec<String> {
        self.webcams.clone()
    }
}
