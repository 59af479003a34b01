use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_directory")]
    pub directory: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
        }
    }
}

fn default_directory() -> String {
    "/queue".to_string()
}
