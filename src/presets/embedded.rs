pub fn embedded_presets() -> &'static [(&'static str, &'static str)] {
    &[
        ("bass", include_str!("../../presets/bass.json")),
        ("calm", include_str!("../../presets/calm.json")),
        ("default", include_str!("../../presets/default.json")),
        ("vivid", include_str!("../../presets/vivid.json")),
    ]
}

pub fn embedded_preset(name: &str) -> Option<&'static str> {
    embedded_presets()
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, json)| *json)
}
