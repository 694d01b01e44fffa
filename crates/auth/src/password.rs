use crate::error::{PolicyError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use std::collections::HashSet;

pub const DEFAULT_MIN_LENGTH: usize = 8;

/// Email local parts shorter than this are not matched against passwords.
const MIN_EMAIL_FRAGMENT: usize = 3;

lazy_static! {
    static ref COMMON_PASSWORDS: HashSet<&'static str> = [
        "password",
        "12345678",
        "123456789",
        "1234567890",
        "qwertyui",
        "qwerty123",
        "admin123",
        "admin1234",
        "welcome1",
        "welcome123",
        "password1",
        "password123",
        "p@ssw0rd",
        "iloveyou",
        "letmein1",
        "abc12345",
        "11111111",
        "00000000",
        "sunshine",
    ]
    .into_iter()
    .collect();
}

/// Password rules applied on registration, password change and reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_number: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            require_upper: false,
            require_lower: false,
            require_number: false,
            require_special: false,
        }
    }
}

impl PasswordPolicy {
    pub fn from_env() -> Self {
        Self {
            min_length: std::env::var("PASSWORD_MIN_LENGTH")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(DEFAULT_MIN_LENGTH),
            require_upper: env_flag("PASSWORD_REQUIRE_UPPER"),
            require_lower: env_flag("PASSWORD_REQUIRE_LOWER"),
            require_number: env_flag("PASSWORD_REQUIRE_NUMBER"),
            require_special: env_flag("PASSWORD_REQUIRE_SPECIAL"),
        }
    }

    fn has_class_requirements(&self) -> bool {
        self.require_upper || self.require_lower || self.require_number || self.require_special
    }

    /// Check `password` against the policy. `email` feeds the contains-email
    /// rule and may be empty.
    pub fn validate(&self, password: &str, email: &str) -> std::result::Result<(), PolicyError> {
        if password.chars().count() < self.min_length {
            return Err(PolicyError::TooShort);
        }

        let lowered = password.to_lowercase();

        if COMMON_PASSWORDS.contains(lowered.as_str()) {
            return Err(PolicyError::TooCommon);
        }

        let local_part = email.split('@').next().unwrap_or_default().trim().to_lowercase();
        if local_part.chars().count() >= MIN_EMAIL_FRAGMENT && lowered.contains(&local_part) {
            return Err(PolicyError::ContainsEmail);
        }

        let classes = CharClasses::of(password);
        let complex_enough = if self.has_class_requirements() {
            (!self.require_upper || classes.upper)
                && (!self.require_lower || classes.lower)
                && (!self.require_number || classes.number)
                && (!self.require_special || classes.special)
        } else {
            classes.count() >= 3
        };

        if !complex_enough {
            return Err(PolicyError::InsufficientComplexity);
        }

        Ok(())
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[derive(Debug, Default, Clone, Copy)]
struct CharClasses {
    upper: bool,
    lower: bool,
    number: bool,
    special: bool,
}

impl CharClasses {
    fn of(password: &str) -> Self {
        let mut classes = Self::default();
        for c in password.chars() {
            if c.is_uppercase() {
                classes.upper = true;
            } else if c.is_lowercase() {
                classes.lower = true;
            } else if c.is_numeric() {
                classes.number = true;
            } else if !c.is_whitespace() && !c.is_control() && !c.is_alphabetic() {
                classes.special = true;
            }
        }
        classes
    }

    fn count(&self) -> usize {
        [self.upper, self.lower, self.number, self.special]
            .iter()
            .filter(|present| **present)
            .count()
    }
}

pub struct PasswordHasher;

impl PasswordHasher {
    /// Hash a password using Argon2id with the default cost parameters. The
    /// PHC output embeds salt and parameters.
    pub fn hash(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let password_hash = argon2.hash_password(password.as_bytes(), &salt)?.to_string();

        Ok(password_hash)
    }

    /// Verify a password against a stored hash. Argon2 PHC strings and legacy
    /// bcrypt hashes are accepted; anything unparseable never matches.
    pub fn verify(hash: &str, password: &str) -> bool {
        if is_bcrypt(hash) {
            return bcrypt::verify(password, hash).unwrap_or_else(|e| {
                tracing::warn!("Unreadable bcrypt hash: {}", e);
                false
            });
        }

        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!("Unreadable password hash: {}", e);
                return false;
            }
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Check if a password needs rehashing (algorithm params changed)
    pub fn needs_rehash(hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return true,
        };

        parsed_hash.algorithm != argon2::Algorithm::Argon2id.ident()
    }
}

fn is_bcrypt(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| hash.starts_with(prefix))
}
