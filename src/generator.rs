// Password generator - one guaranteed character per enabled class, then fill and shuffle
use rand::rngs::ThreadRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
pub const DIGITS: &str = "0123456789";
pub const SYMBOLS: &str = "!@#$%^&*()_+~`|}{[]:;?><,./-=";

pub const DEFAULT_LENGTH: usize = 16;
pub const MAX_LENGTH: usize = 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("Password length must be at least 1")]
    ZeroLength,
    #[error("Password length {0} exceeds the maximum of 1024")]
    TooLong(usize),
    #[error("Select at least one character set")]
    NoClassesEnabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Upper,
    Lower,
    Digit,
    Symbol,
}

impl CharClass {
    pub fn pool(&self) -> &'static str {
        match self {
            CharClass::Upper => UPPERCASE,
            CharClass::Lower => LOWERCASE,
            CharClass::Digit => DIGITS,
            CharClass::Symbol => SYMBOLS,
        }
    }

    pub fn contains(&self, c: char) -> bool {
        self.pool().contains(c)
    }
}

/// Which character classes a password may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharClasses {
    pub upper: bool,
    pub lower: bool,
    pub digit: bool,
    pub symbol: bool,
}

impl Default for CharClasses {
    fn default() -> Self {
        Self::all()
    }
}

impl CharClasses {
    pub fn all() -> Self {
        Self {
            upper: true,
            lower: true,
            digit: true,
            symbol: true,
        }
    }

    pub fn none() -> Self {
        Self {
            upper: false,
            lower: false,
            digit: false,
            symbol: false,
        }
    }

    pub fn enabled(&self) -> Vec<CharClass> {
        [
            (self.upper, CharClass::Upper),
            (self.lower, CharClass::Lower),
            (self.digit, CharClass::Digit),
            (self.symbol, CharClass::Symbol),
        ]
        .into_iter()
        .filter_map(|(on, class)| on.then_some(class))
        .collect()
    }

    pub fn count(&self) -> usize {
        self.enabled().len()
    }
}

pub struct PasswordGenerator<R: Rng = ThreadRng> {
    rng: R,
}

impl PasswordGenerator<ThreadRng> {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }
}

impl Default for PasswordGenerator<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> PasswordGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Generate `length` characters from the enabled classes.
    ///
    /// When `length` is at least the number of enabled classes every enabled
    /// class appears at least once. Shorter passwords keep a random subset of
    /// the guaranteed characters.
    pub fn generate(&mut self, length: usize, classes: CharClasses) -> Result<String, GeneratorError> {
        if length == 0 {
            return Err(GeneratorError::ZeroLength);
        }
        if length > MAX_LENGTH {
            return Err(GeneratorError::TooLong(length));
        }
        let enabled = classes.enabled();
        if enabled.is_empty() {
            return Err(GeneratorError::NoClassesEnabled);
        }

        let union: Vec<char> = enabled.iter().flat_map(|c| c.pool().chars()).collect();

        let mut chars: Vec<char> = enabled
            .iter()
            .map(|class| self.pick(class.pool()))
            .collect();
        while chars.len() < length {
            let c = union[self.rng.gen_range(0..union.len())];
            chars.push(c);
        }

        chars.shuffle(&mut self.rng);
        chars.truncate(length);
        Ok(chars.into_iter().collect())
    }

    /// The context-menu password: default length, every class.
    pub fn generate_strong(&mut self) -> String {
        self.generate(DEFAULT_LENGTH, CharClasses::all())
            .unwrap_or_default()
    }

    fn pick(&mut self, pool: &str) -> char {
        let bytes = pool.as_bytes();
        char::from(bytes[self.rng.gen_range(0..bytes.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded(seed: u64) -> PasswordGenerator<StdRng> {
        PasswordGenerator::with_rng(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_every_enabled_class_is_present() {
        let mut generator = seeded(7);
        for length in 4..40 {
            let password = generator.generate(length, CharClasses::all()).unwrap();
            assert_eq!(password.chars().count(), length);
            for class in CharClasses::all().enabled() {
                assert!(
                    password.chars().any(|c| class.contains(c)),
                    "{:?} missing from {}",
                    class,
                    password
                );
            }
        }
    }

    #[test]
    fn test_only_enabled_classes_used() {
        let mut generator = seeded(11);
        let classes = CharClasses {
            digit: true,
            symbol: true,
            ..CharClasses::none()
        };
        let password = generator.generate(64, classes).unwrap();
        assert!(password
            .chars()
            .all(|c| CharClass::Digit.contains(c) || CharClass::Symbol.contains(c)));
        assert!(password.chars().any(|c| CharClass::Digit.contains(c)));
        assert!(password.chars().any(|c| CharClass::Symbol.contains(c)));
    }

    #[test]
    fn test_short_length_still_exact() {
        let mut generator = seeded(3);
        let password = generator.generate(2, CharClasses::all()).unwrap();
        assert_eq!(password.len(), 2);
        let password = generator.generate(1, CharClasses::all()).unwrap();
        assert_eq!(password.len(), 1);
    }

    #[test]
    fn test_rejects_invalid_requests() {
        let mut generator = seeded(1);
        assert_eq!(
            generator.generate(0, CharClasses::all()),
            Err(GeneratorError::ZeroLength)
        );
        assert_eq!(
            generator.generate(12, CharClasses::none()),
            Err(GeneratorError::NoClassesEnabled)
        );
        assert_eq!(
            generator.generate(MAX_LENGTH + 1, CharClasses::all()),
            Err(GeneratorError::TooLong(MAX_LENGTH + 1))
        );
    }

    #[test]
    fn test_generate_strong_defaults() {
        let password = PasswordGenerator::new().generate_strong();
        assert_eq!(password.len(), DEFAULT_LENGTH);
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| SYMBOLS.contains(c)));
    }
}
