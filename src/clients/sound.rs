//! # Sound Player
//!
//! Plays audio cues by spawning a local player process (`mpv`, `aplay`, ...).
//! Only one cue plays at a time: starting a new one stops the previous playback.
//! Playback is not awaited; the call returns once the player has started.

use crate::config::SoundConfig;
use crate::framework::{AudioPlayer, StepError, Transport, TransportError, TransportKind};
use crate::model::SoundCue;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const NAME: &str = "sound";

pub struct SoundPlayer {
    config: SoundConfig,
    current: Mutex<Option<Child>>,
    ready: AtomicBool,
}

impl SoundPlayer {
    pub fn new(config: SoundConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    /// Runs `<player> --version` to check the player exists and starts.
    async fn check_player(&self) -> Result<(), TransportError> {
        let status = Command::new(&self.config.player_command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                TransportError::unavailable(NAME, format!("{}: {e}", self.config.player_command))
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(TransportError::unavailable(
                NAME,
                format!("{} --version exited with {status}", self.config.player_command),
            ))
        }
    }

    /// Stops the running playback, if any. Kills it if it outlives the stop timeout.
    async fn stop_current(&self, current: &mut Option<Child>) {
        let Some(mut child) = current.take() else {
            return;
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if let Err(e) = child.start_kill() {
            warn!(transport = NAME, error = %e, "Failed to stop playback");
            return;
        }
        match tokio::time::timeout(self.config.stop_timeout, child.wait()).await {
            Ok(_) => debug!("Previous playback stopped"),
            Err(_) => warn!(
                transport = NAME,
                timeout = ?self.config.stop_timeout,
                "Previous playback did not exit in time"
            ),
        }
    }
}

#[async_trait]
impl Transport for SoundPlayer {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> TransportKind {
        TransportKind::LocalOs
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        self.check_player().await?;
        for (cue, path) in &self.config.audio_files {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                warn!(transport = NAME, %cue, path = %path.display(), "Audio file not found");
            }
        }
        self.ready.store(true, Ordering::SeqCst);
        info!(transport = NAME, player = %self.config.player_command, "Sound player initialized");
        Ok(())
    }

    async fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        let mut current = self.current.lock().await;
        self.stop_current(&mut current).await;
        info!(transport = NAME, "Sound player shut down");
    }

    async fn health_check(&self) -> Result<bool, TransportError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(TransportError::NotInitialized(NAME.into()));
        }
        self.check_player().await?;
        Ok(true)
    }
}

#[async_trait]
impl AudioPlayer for SoundPlayer {
    #[instrument(skip(self))]
    async fn play(&self, cue: SoundCue) -> Result<(), StepError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(TransportError::NotInitialized(NAME.into()).into());
        }
        let file = self
            .config
            .audio_files
            .get(&cue)
            .ok_or_else(|| StepError::Validation(format!("no audio file configured for {cue}")))?;

        let mut current = self.current.lock().await;
        self.stop_current(&mut current).await;

        let child = Command::new(&self.config.player_command)
            .args(&self.config.player_args)
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::unavailable(NAME, e))?;
        debug!(pid = ?child.id(), "Playback started");
        *current = Some(child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn config(player: &str) -> SoundConfig {
        SoundConfig {
            player_command: player.into(),
            player_args: Vec::new(),
            audio_files: BTreeMap::from([(
                SoundCue::OrderComplete,
                PathBuf::from("/tmp/done.wav"),
            )]),
            ..SoundConfig::default()
        }
    }

    #[tokio::test]
    async fn plays_configured_cues() {
        let player = SoundPlayer::new(config("true"));
        player.initialize().await.unwrap();
        assert!(player.is_healthy().await);

        player.play(SoundCue::OrderComplete).await.unwrap();
        // Second play stops (or reaps) the first one.
        player.play(SoundCue::OrderComplete).await.unwrap();
        player.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_cue_is_a_validation_error() {
        let player = SoundPlayer::new(config("true"));
        player.initialize().await.unwrap();
        let err = player.play(SoundCue::ErrorAlert).await.unwrap_err();
        assert!(matches!(err, StepError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_player_fails_initialize() {
        let player = SoundPlayer::new(config("definitely-not-an-audio-player"));
        assert!(matches!(
            player.initialize().await,
            Err(TransportError::Unavailable { .. })
        ));
        assert!(!player.is_healthy().await);
    }
}
