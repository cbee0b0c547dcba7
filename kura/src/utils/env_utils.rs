#[derive(Copy, Clone, Debug)]
pub enum KuraEnvVar {
    StorageDir,
    Home,
}

impl KuraEnvVar {
    pub fn key(&self) -> &'static str {
        match self {
            KuraEnvVar::StorageDir => "KURA_STORAGE_DIR",
            KuraEnvVar::Home => "HOME",
        }
    }

    /// Value of the variable, treating an empty value as unset.
    pub fn value(&self) -> Option<String> {
        std::env::var(self.key()).ok().filter(|value| !value.is_empty())
    }
}
