//! Translation of third-party LoRA tensor names into model weight paths.

const PREFIXES: [&str; 2] = ["lora_unet_", "diffusion_model."];

const FEED_FORWARD_SCOPES: [&str; 2] = ["ff", "ff_context"];

const FEED_FORWARD_PROJECTIONS: [(&str, &str); 2] =
    [("net.0.proj", "linear1"), ("net.2.proj", "linear2")];

/// Maps a LoRA key onto the base model's naming. An empty result means the
/// key names no weight.
pub fn remap_weight_key(key: &str) -> String {
    let mut key = key;
    for prefix in PREFIXES {
        key = key.strip_prefix(prefix).unwrap_or(key);
    }

    let segments: Vec<&str> = key.split('.').collect();
    let mut remapped: Vec<&str> = Vec::with_capacity(segments.len());
    let mut index = 0;
    while index < segments.len() {
        remapped.push(segments[index]);
        if FEED_FORWARD_SCOPES.contains(&segments[index]) {
            let rest = &segments[index + 1..];
            if let Some((projection, replacement)) =
                FEED_FORWARD_PROJECTIONS.iter().find(|(projection, _)| {
                    let pattern: Vec<&str> = projection.split('.').collect();
                    rest.starts_with(&pattern)
                })
            {
                remapped.push(*replacement);
                index += 1 + projection.split('.').count();
                continue;
            }
        }
        index += 1;
    }
    remapped.join(".")
}
