//! Sonde de durée vidéo
//!
//! Le scan ne sonde jamais : la durée est calculée au premier besoin réel
//! d'un consommateur, puis mise en cache contre (taille, mtime) pour que
//! les fichiers inchangés ne soient jamais re-sondés.

use std::path::Path;
use std::process::Command;
use std::time::SystemTime;

/// Sonde retournant la durée d'une vidéo en secondes entières
///
/// Un échec de sonde est une donnée, pas une erreur : l'appelant dégrade
/// vers 0 seconde.
pub trait DurationProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Option<u64>;
}

/// Sonde par défaut, basée sur `ffprobe`
///
/// Appel synchrone et borné : ffprobe lit l'en-tête du conteneur et rend la
/// main immédiatement.
#[derive(Debug, Default)]
pub struct FfprobeDurationProbe;

impl DurationProbe for FfprobeDurationProbe {
    fn probe(&self, path: &Path) -> Option<u64> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output();

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                tracing::warn!(
                    path=%path.display(),
                    status=%output.status,
                    "ffprobe exited with failure"
                );
                return None;
            }
            Err(e) => {
                tracing::warn!(path=%path.display(), error=%e, "Failed to run ffprobe");
                return None;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.trim().parse::<f64>() {
            Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => Some(seconds as u64),
            _ => {
                tracing::warn!(path=%path.display(), "Unparseable ffprobe duration output");
                None
            }
        }
    }
}

/// Empreinte d'un fichier au moment de la sonde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileStamp {
    pub size: u64,
    pub mtime: SystemTime,
}

impl FileStamp {
    /// Empreinte courante du fichier, None si le stat échoue
    pub fn of(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self {
            size: metadata.len(),
            mtime: metadata.modified().ok()?,
        })
    }
}

/// Entrée du cache de durées
#[derive(Debug, Clone, Copy)]
pub(crate) struct DurationEntry {
    pub stamp: FileStamp,
    pub seconds: u64,
}
