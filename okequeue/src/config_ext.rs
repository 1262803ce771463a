//! Extension de okeconfig pour les files karaoké

/// Trait d'extension pour okeconfig::Config
pub trait QueueConfigExt {
    /// Limite de chansons par utilisateur et par session (`None` = illimité)
    fn quota_per_user(&self) -> Option<u32>;
}

impl QueueConfigExt for okeconfig::Config {
    fn quota_per_user(&self) -> Option<u32> {
        match self.get_quota_per_user() {
            0 => None,
            limit => Some(limit as u32),
        }
    }
}
