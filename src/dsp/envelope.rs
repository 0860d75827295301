//! Linear ADSR envelope, used both for the exciter burst and the amplitude.

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope with linear segments.
///
/// Times are read when a stage starts, so changing them mid-note only
/// affects the following stages. The sustain level is read every sample.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Attack time in seconds.
    pub attack: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    /// Release time in seconds.
    pub release: f64,

    stage: EnvelopeStage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage.
    start_level: f64,
}

impl Envelope {
    pub fn new(sample_rate: f64) -> Self {
        Envelope {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
        }
    }

    /// Set all four ADSR values at once. Negative or NaN times become zero; a
    /// NaN sustain keeps the previous level.
    pub fn set_adsr(&mut self, attack: f64, decay: f64, sustain: f64, release: f64) {
        self.attack = attack.max(0.0);
        self.decay = decay.max(0.0);
        if sustain.is_finite() {
            self.sustain = sustain.clamp(0.0, 1.0);
        }
        self.release = release.max(0.0);
    }

    /// Trigger the envelope. Attack starts from the current level.
    pub fn gate_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.stage_samples = self.samples_for(self.attack);
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    /// Enter the release stage from wherever the envelope is.
    pub fn gate_off(&mut self) {
        if self.stage == EnvelopeStage::Idle || self.stage == EnvelopeStage::Release {
            return;
        }
        self.stage = EnvelopeStage::Release;
        self.stage_samples = self.samples_for(self.release);
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    /// Jump straight to idle at zero level.
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
        self.stage_samples = 0;
        self.stage_counter = 0;
        self.start_level = 0.0;
    }

    /// Generate the next envelope sample [0, 1].
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                if self.advance() {
                    self.level = 1.0;
                    self.enter(EnvelopeStage::Decay, self.decay);
                } else {
                    let t = self.progress();
                    self.level = self.start_level + (1.0 - self.start_level) * t;
                }
            }
            EnvelopeStage::Decay => {
                if self.advance() {
                    self.level = self.sustain;
                    self.stage = EnvelopeStage::Sustain;
                } else {
                    let t = self.progress();
                    self.level = 1.0 - (1.0 - self.sustain) * t;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.sustain;
            }
            EnvelopeStage::Release => {
                if self.advance() {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                } else {
                    self.level = self.start_level * (1.0 - self.progress());
                }
            }
        }
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// True once the envelope is idle (never triggered, or release done).
    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    /// Count one sample of the current stage; true when the stage is over.
    fn advance(&mut self) -> bool {
        if self.stage_counter >= self.stage_samples {
            return true;
        }
        self.stage_counter += 1;
        false
    }

    fn progress(&self) -> f64 {
        self.stage_counter as f64 / self.stage_samples as f64
    }

    fn enter(&mut self, stage: EnvelopeStage, seconds: f64) {
        self.stage = stage;
        self.stage_samples = self.samples_for(seconds);
        self.stage_counter = 0;
    }

    fn samples_for(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate) as usize
    }
}
