//! Audio is an external collaborator: the runtime decides *what* to play
//! (first sound of a visible sound object, looping, at the object's
//! volume) and hands it to a [`SoundPlayer`].

use std::path::{Path, PathBuf};

use crate::scene::model::SceneObject;

pub trait SoundPlayer {
    fn play(&mut self, path: &Path, volume: f64, looping: bool);
    fn update(&mut self) {}
    fn stop_all(&mut self) {}
}

/// Default player: logs what would be played. Keeps headless runs and tests
/// silent without special-casing sound objects.
#[derive(Default)]
pub struct NullSoundPlayer;

impl SoundPlayer for NullSoundPlayer {
    fn play(&mut self, path: &Path, volume: f64, looping: bool) {
        log::info!(
            "audio: would play {} (volume {volume:.2}, looping {looping})",
            path.display()
        );
    }
}

/// Starts playback for a sound object if it qualifies.
pub fn start_object_sound(
    player: &mut dyn SoundPlayer,
    tmp_dir: &Path,
    object: &SceneObject,
    silent: bool,
) {
    if silent || !object.visible.get() || object.sound.is_empty() {
        return;
    }
    let path: PathBuf = tmp_dir.join(&object.sound[0]);
    player.play(&path, object.volume.base(), true);
}
