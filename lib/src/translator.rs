/// External collaborator for translating display strings (spec §1
/// "a translation loader ... narrow interface only"). The default passes
/// every string through unchanged, which is exactly correct for the
/// catalog's base locale.
pub trait Translator: Send + Sync {
    fn translate(&self, source: &str, _locale: &str) -> String {
        source.to_string()
    }
}

pub struct PassthroughTranslator;
impl Translator for PassthroughTranslator {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_input_unchanged() {
        let t = PassthroughTranslator;
        assert_eq!(t.translate("Power", "de_DE"), "Power");
    }
}
