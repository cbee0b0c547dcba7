use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TextEncoderConfig {
    #[serde(default)]
    pub model_type: Option<String>,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    #[serde(default)]
    pub vocab_size: Option<usize>,
    #[serde(default)]
    pub max_position_embeddings: Option<usize>,
}

impl TextEncoderConfig {
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads.max(1)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::from_str;

    use super::*;

    #[test]
    fn test_text_encoder_config() {
        let config_str = r#"
            {
                "model_type": "t5",
                "hidden_size": 4096,
                "num_hidden_layers": 24,
                "num_attention_heads": 64,
                "vocab_size": 32128,
                "torch_dtype": "bfloat16"
            }
        "#;
        let config: TextEncoderConfig = from_str(config_str).unwrap();
        assert_eq!(config.head_dim(), 64);
        assert_eq!(config.max_position_embeddings, None);
        assert!(from_str::<TextEncoderConfig>(r#"{"hidden_size": 8}"#).is_err());
    }
}
