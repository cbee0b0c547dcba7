use serde::{Deserialize, Serialize};

fn default_num_train_timesteps() -> usize {
    1000
}

fn default_shift() -> f32 {
    1.0
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SchedulerConfig {
    #[serde(rename = "_class_name", default)]
    pub class_name: Option<String>,
    #[serde(default = "default_num_train_timesteps")]
    pub num_train_timesteps: usize,
    #[serde(default = "default_shift")]
    pub shift: f32,
    #[serde(default)]
    pub use_dynamic_shifting: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            class_name: None,
            num_train_timesteps: default_num_train_timesteps(),
            shift: default_shift(),
            use_dynamic_shifting: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::from_str;

    use super::*;

    #[test]
    fn test_scheduler_config() {
        let config: SchedulerConfig = from_str(
            r#"{"_class_name": "FlowMatchEulerDiscreteScheduler", "shift": 3.0}"#,
        )
        .unwrap();
        assert_eq!(
            config.class_name.as_deref(),
            Some("FlowMatchEulerDiscreteScheduler")
        );
        assert_eq!(config.num_train_timesteps, 1000);
        assert_eq!(config.shift, 3.0);
        assert!(!config.use_dynamic_shifting);
        assert_eq!(
            from_str::<SchedulerConfig>("{}").unwrap(),
            SchedulerConfig::default()
        );
    }
}
