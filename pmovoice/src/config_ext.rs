//! Extension de pmoconfig pour la reprise et le pipeline PCM

use std::path::PathBuf;

use pmoconfig::Config;

const SNAPSHOT_DB_FILE: &str = "recovery.db";

/// Trait d'extension pour pmoconfig::Config
pub trait VoiceConfigExt {
    /// Chemin de la base des instantanés de reprise
    fn snapshot_db_path(&self) -> anyhow::Result<PathBuf>;

    /// Message posté lorsqu'une lecture reprend après un redémarrage
    fn resume_message(&self) -> String;

    /// Limite de recherche de l'en-tête des conteneurs
    fn header_scan_limit(&self) -> usize;

    /// Taille du tampon entre un producteur et son lecteur
    fn producer_pipe_size(&self) -> usize;
}

impl VoiceConfigExt for Config {
    fn snapshot_db_path(&self) -> anyhow::Result<PathBuf> {
        // get_managed_dir crée le répertoire s'il n'existe pas
        let recovery_dir = self.get_managed_dir(&["voice", "recovery", "directory"], "recovery")?;
        Ok(recovery_dir.join(SNAPSHOT_DB_FILE))
    }

    fn resume_message(&self) -> String {
        self.get_resume_message()
            .unwrap_or_else(|_| "Reading resumes in this channel.".to_owned())
    }

    fn header_scan_limit(&self) -> usize {
        self.get_header_scan_limit()
            .unwrap_or(pmopcm::DEFAULT_SCAN_LIMIT)
    }

    fn producer_pipe_size(&self) -> usize {
        self.get_producer_pipe_size()
            .unwrap_or(pmopcm::DEFAULT_PIPE_SIZE)
    }
}
