use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::error::{PackError, PackResult};

/// Filename fragments of mods that must not stay in a server mods directory:
/// client-only rendering/UI mods and mods known to crash or miss dependencies.
const BUILTIN_PATTERNS: &[&str] = &[
    // client-side rendering / UI
    "Axiom", "axiom", "dungeondodgeplus", "tweakermore", "mutantmonsters", "MutantMonsters",
    // client-side functionality
    "flashside", "visible-entities", "visible", "modelfix", "Gamma-Utils", "gamma",
    "lambdynamiclights", "dynamic-lights", "Zoomify", "zoom", "f3teverywhere", "f3",
    "BetterF3", "morechathistory", "chat_heads", "chat-heads", "iris", "sodium",
    "reeses-sodium", "sodium-extra", "skinlayers3d", "skinlayers", "notenoughanimations",
    "capes", "entity_model_features", "entity_texture_features", "xaerominimap", "Xaeros",
    "minecartsloadchunks",
    // known server crashes
    "dungeons-and-taverns", "adventuremodetweaks", "attributerpgfied", "nemos-carpentry",
    "structurevoidable", "structure_void_toggle", "structure_void",
    "monsters_in_the_closet", "monsters-in-the-closet", "c2me-opts-natives-math",
    // missing dependencies
    "biomereplacer", "rpg-stash", "takesarmory", "combat-control",
    "more_tools_and_armor", "mstv-", "dcqinv", "combatamenities", "betterchromakey",
    "inventoryprofilesnext", "magic-bundle",
];

/// Case-sensitive substring patterns; a filename containing any of them is
/// denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denylist {
    patterns: Vec<String>,
}

impl Denylist {
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::from_patterns(BUILTIN_PATTERNS.iter().copied())
    }

    /// Parse a pattern file: one pattern per line, `#` starts a comment line.
    pub fn parse(text: &str) -> Self {
        Self::from_patterns(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    pub fn load(path: &Path) -> PackResult<Self> {
        let text = fs::read_to_string(path).map_err(PackError::io_at(path))?;
        let list = Self::parse(&text);
        debug!("Loaded {} denylist pattern(s) from {:?}", list.len(), path);
        Ok(list)
    }

    /// First pattern contained in `filename`.
    pub fn matching(&self, filename: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| filename.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, filename: &str) -> bool {
        self.matching(filename).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_match_is_case_sensitive() {
        let list = Denylist::from_patterns(["Zoomify", "iris"]);
        assert!(list.matches("Zoomify-2.14.2+1.21.5.jar"));
        assert!(!list.matches("zoomify-2.14.2+1.21.5.jar"));
        assert_eq!(list.matching("iris-fabric-1.8.8.jar"), Some("iris"));
        assert!(!list.matches("lithium-fabric-0.16.2.jar"));
    }

    #[test]
    fn parse_skips_comments_and_blanks() {
        let list = Denylist::parse("# client only\n\nsodium\n  axiom  \n#iris\n");
        assert_eq!(list.len(), 2);
        assert!(list.matches("axiom-4.0.jar"));
        assert!(!list.matches("iris-1.8.jar"));
    }

    #[test]
    fn builtin_list_denies_client_renderers() {
        let list = Denylist::builtin();
        assert!(list.matches("sodium-fabric-0.6.12+mc1.21.5.jar"));
        assert!(!list.matches("ferritecore-7.1.1-fabric.jar"));
    }
}
