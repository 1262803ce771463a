//! okeconfig extension building the playback policy.

use crate::selector::{EncorePolicy, PlayPolicy};

/// Extension trait for okeconfig::Config
pub trait PlayerConfigExt {
    /// Build the playback policy from the `karaoke` / `player` sections.
    fn play_policy(&self) -> PlayPolicy;
}

impl PlayerConfigExt for okeconfig::Config {
    fn play_policy(&self) -> PlayPolicy {
        PlayPolicy {
            jingle_interval: self.get_jingle_interval() as u32,
            sponsor_interval: self.get_sponsor_interval() as u32,
            intro_duration: non_zero(self.get_intro_duration() as u32),
            outro_duration: non_zero(self.get_outro_duration() as u32),
            encore: EncorePolicy {
                enabled: self.get_encore_enabled(),
                probability: self.get_encore_probability(),
            },
            repeat_playlist: self.get_repeat_playlist(),
            quota_per_user: non_zero(self.get_quota_per_user() as u32),
            classic_mode: self.get_classic_mode(),
            auto_restart: self.get_auto_restart(),
            load_timeout_secs: self.get_load_timeout() as u64,
        }
    }
}

fn non_zero(value: u32) -> Option<u32> {
    if value == 0 { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> (tempfile::TempDir, okeconfig::Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = okeconfig::Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_policy_from_default_config() {
        let (_dir, config) = config();
        let policy = config.play_policy();

        assert_eq!(policy.jingle_interval, 20);
        assert_eq!(policy.sponsor_interval, 50);
        assert_eq!(policy.intro_duration, None);
        assert_eq!(policy.outro_duration, None);
        assert!(!policy.encore.enabled);
        assert!(!policy.repeat_playlist);
        assert!(!policy.classic_mode);
        assert_eq!(policy.load_timeout_secs, 10);
    }

    #[test]
    fn test_zero_duration_disables_the_filler() {
        let (_dir, config) = config();
        config.set_intro_duration(0).unwrap();
        config.set_outro_duration(25).unwrap();

        let policy = config.play_policy();
        assert_eq!(policy.intro_duration, None);
        assert_eq!(policy.outro_duration, Some(25));
    }
}
