//! Audio cue playback from SPIFFS.
//!
//! Clips are short AAC files baked into the SPIFFS image. Playback is
//! one clip at a time; a non-interrupting play request is dropped if
//! something is already sounding. The decode/I2S pipeline is injected
//! as a sink so this adapter stays free of driver state; the pipeline
//! calls [`finish_current`](SpiffsAudio::finish_current) when a clip
//! drains.

use std::sync::Mutex;

use log::debug;

use crate::ports::{AudioOut, SoundClip};

type PipelineSink = Box<dyn Fn(&'static str) + Send + Sync>;

fn clip_path(clip: SoundClip) -> &'static str {
    match clip {
        SoundClip::PowerOn => "/spiffs/General/PowerOn.aac",
        SoundClip::PairStart => "/spiffs/General/PairStart.aac",
        SoundClip::PairSuccess => "/spiffs/General/PairSuccess.aac",
        SoundClip::PairFail => "/spiffs/General/PairFail.aac",
        SoundClip::LowBattery => "/spiffs/General/LowBattery.aac",
        SoundClip::BatteryEmpty => "/spiffs/General/BatteryEmpty.aac",
    }
}

pub struct SpiffsAudio {
    current: Mutex<Option<SoundClip>>,
    sink: Option<PipelineSink>,
}

impl SpiffsAudio {
    /// Log-only playback (host simulation).
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            sink: None,
        }
    }

    /// Playback feeding the given decode pipeline.
    pub fn with_pipeline(sink: PipelineSink) -> Self {
        Self {
            current: Mutex::new(None),
            sink: Some(sink),
        }
    }

    /// Called by the playback pipeline when the active clip ends.
    pub fn finish_current(&self) {
        *self.current.lock().expect("audio poisoned") = None;
    }
}

impl Default for SpiffsAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOut for SpiffsAudio {
    fn play(&self, clip: SoundClip, interrupt: bool) {
        {
            let mut current = self.current.lock().expect("audio poisoned");
            if current.is_some() && !interrupt {
                return;
            }
            *current = Some(clip);
        }
        let path = clip_path(clip);
        match &self.sink {
            Some(sink) => sink(path),
            None => debug!("audio: would play {path}"),
        }
    }

    fn current(&self) -> Option<SoundClip> {
        *self.current.lock().expect("audio poisoned")
    }
}
