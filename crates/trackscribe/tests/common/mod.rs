//! Fakes for the media toolchain and the classifier.
//!
//! `FakeMedia` synthesizes audio instead of running ffmpeg: tempo windows get a
//! click track, probe windows get a constant signal equal to the window start
//! so `FakeClassifier` can tell the windows apart.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use trackscribe::{
    Classifier, ClassifierError, DecodeRequest, LabelScore, Loudness, MediaError, MediaTool,
    PcmFormat, TrackMetadata,
};

pub struct FakeMedia {
    pub duration: f64,
    pub bpm: f64,
    pub fail_probe: bool,
}

impl FakeMedia {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            bpm: 120.0,
            fail_probe: false,
        }
    }
}

/// Mono click track: a 200-sample burst on every beat.
pub fn click_track(bpm: f64, seconds: f64, rate: u32) -> Vec<i16> {
    let rate = rate as f64;
    let total = (seconds * rate) as usize;
    let period = rate * 60.0 / bpm;
    let mut samples = vec![0i16; total];

    let mut beat = 0.0;
    while (beat as usize) < total {
        for s in samples.iter_mut().skip(beat as usize).take(200) {
            *s = 26_000;
        }
        beat += period;
    }
    samples
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn probe_metadata(&self, _path: &Path) -> Result<TrackMetadata, MediaError> {
        if self.fail_probe {
            return Err(MediaError::Exit {
                tool: "ffprobe".into(),
                status: "exit status: 1".into(),
                stderr: "Invalid data found when processing input".into(),
            });
        }
        Ok(TrackMetadata {
            duration_sec: self.duration,
            bit_rate: 320_000,
            sample_rate: 44_100,
            channels: 2,
            codec: "mp3".into(),
        })
    }

    async fn decode_pcm(
        &self,
        request: &DecodeRequest,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, MediaError> {
        match request.format {
            PcmFormat::S16Le => Ok(click_track(
                self.bpm,
                request.window.length,
                request.sample_rate,
            )
            .into_iter()
            .flat_map(|s| s.to_le_bytes())
            .collect()),
            PcmFormat::F32Le => {
                let marker = request.window.start as f32;
                Ok((0..1024).flat_map(|_| marker.to_le_bytes()).collect())
            }
        }
    }

    async fn measure_loudness(&self, _path: &Path) -> Result<Loudness, MediaError> {
        Ok(Loudness {
            lufs_integrated: Some(-14.0),
            loudness_range: Some(5.5),
            true_peak_db: Some(-1.0),
        })
    }
}

#[derive(Clone)]
pub enum Behaviour {
    Scores(Vec<(&'static str, f64)>),
    /// Never answers.
    Hang,
    Unavailable,
}

/// Classifier answering per window start (audio) or with a fixed text answer.
pub struct FakeClassifier {
    pub windows: Vec<(f64, Behaviour)>,
    pub text: Behaviour,
    /// Tokens handed to the classifier, in call order.
    pub tokens: Mutex<Vec<CancellationToken>>,
}

impl FakeClassifier {
    pub fn new(windows: Vec<(f64, Behaviour)>, text: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            windows,
            text,
            tokens: Mutex::new(Vec::new()),
        })
    }

    pub fn cancelled_calls(&self) -> usize {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_cancelled())
            .count()
    }

    async fn respond(
        &self,
        behaviour: Behaviour,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError> {
        self.tokens.lock().unwrap().push(cancel.clone());
        match behaviour {
            Behaviour::Scores(scores) => Ok(Some(
                scores
                    .into_iter()
                    .map(|(label, score)| LabelScore {
                        label: label.to_string(),
                        score,
                    })
                    .collect(),
            )),
            Behaviour::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Behaviour::Unavailable => Ok(None),
        }
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify_audio(
        &self,
        samples: &[f32],
        _sample_rate: u32,
        _labels: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError> {
        let start = samples.first().copied().unwrap_or(-1.0) as f64;
        let behaviour = self
            .windows
            .iter()
            .find(|(s, _)| (s - start).abs() < 1e-3)
            .map(|(_, b)| b.clone())
            .unwrap_or(Behaviour::Unavailable);
        self.respond(behaviour, cancel).await
    }

    async fn classify_text(
        &self,
        _text: &str,
        _labels: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError> {
        self.respond(self.text.clone(), cancel).await
    }
}
