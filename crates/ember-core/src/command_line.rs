use std::collections::HashMap;

use parking_lot::{const_rwlock, RwLock};

static GLOBAL: RwLock<Option<CommandLine>> = const_rwlock(None);

/// Parsed command-line parameter store.
///
/// Tokens are `-flag` or `-flag=value`, separated by spaces. Double quotes
/// toggle a quoted region in which spaces are literal; the quote characters
/// themselves are stripped. A flag without a value stores `"1"`.
#[derive(Default)]
pub struct CommandLine {
    parameters: HashMap<String, String>,
}

impl CommandLine {
    pub fn parse(command_line: &str) -> Self {
        let mut parameters = HashMap::new();
        let mut quoted = false;
        let mut token = String::new();

        let mut commit = |token: &mut String| {
            if let Some(stripped) = token.strip_prefix('-') {
                match stripped.split_once('=') {
                    Some((identifier, value)) => {
                        parameters.insert(identifier.to_string(), value.to_string());
                    }
                    None => {
                        parameters.insert(stripped.to_string(), "1".to_string());
                    }
                }
            }
            token.clear();
        };

        for c in command_line.chars() {
            if c == '"' {
                quoted = !quoted;
            } else if c == ' ' && !quoted {
                commit(&mut token);
            } else {
                token.push(c);
            }
        }
        commit(&mut token);

        Self { parameters }
    }

    /// Install the parsed parameters as the process-wide store.
    pub fn init(command_line: &str) {
        *GLOBAL.write() = Some(Self::parse(command_line));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// A flag is true simply by being present.
    pub fn get_bool(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Integer extraction requires an all-digit value, else the default.
    pub fn get_int(&self, name: &str, default: i32) -> i32 {
        match self.parameters.get(name) {
            Some(value) if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) => {
                value.parse().unwrap_or(default)
            }
            _ => default,
        }
    }

    pub fn global_get_bool(name: &str) -> bool {
        GLOBAL.read().as_ref().map_or(false, |cl| cl.get_bool(name))
    }

    pub fn global_get_int(name: &str, default: i32) -> i32 {
        GLOBAL
            .read()
            .as_ref()
            .map_or(default, |cl| cl.get_int(name, default))
    }

    pub fn global_get(name: &str) -> Option<String> {
        GLOBAL
            .read()
            .as_ref()
            .and_then(|cl| cl.get(name).map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::CommandLine;

    #[test]
    fn flags_and_values() {
        let cl = CommandLine::parse(
            "-d3ddebug -warp -tonemapper=2 -samples=16 \"-screenshotDir=C:\\out put\\\"",
        );
        assert_eq!(cl.get("d3ddebug"), Some("1"));
        assert_eq!(cl.get("warp"), Some("1"));
        assert_eq!(cl.get("tonemapper"), Some("2"));
        assert_eq!(cl.get("samples"), Some("16"));
        assert_eq!(cl.get("screenshotDir"), Some("C:\\out put\\"));

        assert_eq!(cl.get_int("tonemapper", 0), 2);
        assert_eq!(cl.get_int("samples", 0), 16);
        assert!(cl.get_bool("d3ddebug"));
        assert!(!cl.get_bool("dred"));
    }

    #[test]
    fn int_extraction_requires_digits() {
        let cl = CommandLine::parse("-width=abc -height=1080");
        assert_eq!(cl.get_int("width", 1280), 1280);
        assert_eq!(cl.get_int("height", 720), 1080);
        assert_eq!(cl.get_int("missing", 42), 42);
    }

    #[test]
    fn quoted_value_preserves_spaces() {
        let cl = CommandLine::parse("-dir=\"a b c\" -other");
        assert_eq!(cl.get("dir"), Some("a b c"));
        assert!(cl.get_bool("other"));
    }
}
