use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    #[serde(default = "default_producers")]
    pub producers: usize,
    #[serde(default = "default_consumers")]
    pub consumers: usize,
    #[serde(default = "default_items")]
    pub items: usize,
    #[serde(default = "default_payload_prefix")]
    pub payload_prefix: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            producers: default_producers(),
            consumers: default_consumers(),
            items: default_items(),
            payload_prefix: default_payload_prefix(),
        }
    }
}

fn default_producers() -> usize {
    2
}

fn default_consumers() -> usize {
    2
}

fn default_items() -> usize {
    100
}

fn default_payload_prefix() -> String {
    "Hello World".to_string()
}
