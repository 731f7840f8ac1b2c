//! Time-limited codes for signup verification and password reset.

use super::{
    errors::{AuthError, AuthResult},
    models::{UserId, VerificationCode},
};
use crate::db::repository::VerificationCodeRepository;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;

/// Digits 1-9; zero is left out so it cannot be mistaken for the letter O.
pub const CODE_CHARSET: &[u8] = b"123456789";

/// Attempts at finding a code that no other user currently holds
const MAX_ISSUE_ATTEMPTS: usize = 10;

/// Random code of `length` characters drawn from [`CODE_CHARSET`].
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// What a code is for. The two purposes have separate lifetimes and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    /// Stored in the verification code repository
    SignupVerification,
    /// Stored on the user record by the caller
    PasswordReset,
}

/// A freshly issued code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of looking up a signup code
#[derive(Debug, Clone)]
pub enum CodeCheck {
    /// Unexpired; the caller must consume it once acted upon
    Valid(VerificationCode),
    Invalid,
    Expired,
}

/// Issues and validates codes
#[derive(Clone)]
pub struct CodeIssuer {
    codes: Arc<dyn VerificationCodeRepository>,
    length: usize,
    signup_ttl: Duration,
    reset_ttl: Duration,
}

impl CodeIssuer {
    pub fn new(
        codes: Arc<dyn VerificationCodeRepository>,
        length: usize,
        signup_ttl: Duration,
        reset_ttl: Duration,
    ) -> Self {
        Self {
            codes,
            length: length.max(1),
            signup_ttl,
            reset_ttl,
        }
    }

    fn ttl(&self, purpose: CodePurpose) -> Duration {
        match purpose {
            CodePurpose::SignupVerification => self.signup_ttl,
            CodePurpose::PasswordReset => self.reset_ttl,
        }
    }

    /// Issue a code for `user_id`.
    ///
    /// Signup codes replace every outstanding code of the user. Reset codes
    /// are only generated here; the caller stores them on the user record,
    /// overwriting the previous one.
    pub async fn issue(
        &self,
        user_id: UserId,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedCode> {
        let expires_at = now + self.ttl(purpose);

        if purpose == CodePurpose::PasswordReset {
            return Ok(IssuedCode {
                code: generate_code(self.length),
                expires_at,
            });
        }

        // A code held live by someone else would verify the wrong account.
        let mut collisions = 0;
        let code = loop {
            let candidate = generate_code(self.length);
            match self.codes.find_by_code(&candidate).await? {
                Some(existing) if existing.user_id != user_id && existing.expires_at > now => {
                    collisions += 1;
                    if collisions >= MAX_ISSUE_ATTEMPTS {
                        log::error!(
                            "No free {}-character code for user {} after {} attempts",
                            self.length,
                            user_id,
                            collisions
                        );
                        return Err(AuthError::CodeUnavailable);
                    }
                }
                _ => break candidate,
            }
        };

        let record = self
            .codes
            .replace_for_user(user_id, &code, now, expires_at)
            .await?;

        Ok(IssuedCode {
            code: record.code,
            expires_at: record.expires_at,
        })
    }

    /// Look up a signup code. Expired codes are reported as such, not as invalid.
    pub async fn validate(&self, code: &str, now: DateTime<Utc>) -> AuthResult<CodeCheck> {
        let Some(record) = self.codes.find_by_code(code).await? else {
            return Ok(CodeCheck::Invalid);
        };

        if record.expires_at <= now {
            return Ok(CodeCheck::Expired);
        }

        Ok(CodeCheck::Valid(record))
    }

    /// Remove a signup code so it cannot be replayed
    pub async fn consume(&self, record: &VerificationCode) -> AuthResult<()> {
        self.codes.delete(record.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryStore;
    use proptest::prelude::*;

    fn issuer() -> CodeIssuer {
        CodeIssuer::new(
            Arc::new(InMemoryStore::new()),
            6,
            Duration::hours(1),
            Duration::minutes(30),
        )
    }

    proptest! {
        #[test]
        fn generated_codes_use_charset(length in 1usize..32) {
            let code = generate_code(length);
            prop_assert_eq!(code.len(), length);
            prop_assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
            prop_assert!(!code.contains('0'));
        }
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let issuer = issuer();
        let now = Utc::now();
        let issued = issuer
            .issue(7, CodePurpose::SignupVerification, now)
            .await
            .unwrap();

        assert_eq!(issued.code.len(), 6);
        assert_eq!(issued.expires_at, now + Duration::hours(1));

        match issuer.validate(&issued.code, now).await.unwrap() {
            CodeCheck::Valid(record) => {
                assert_eq!(record.user_id, 7);
                issuer.consume(&record).await.unwrap();
            }
            other => panic!("expected valid code, got {:?}", other),
        }

        assert!(matches!(
            issuer.validate(&issued.code, now).await.unwrap(),
            CodeCheck::Invalid
        ));
    }

    #[tokio::test]
    async fn test_expired_is_distinguished() {
        let issuer = issuer();
        let now = Utc::now();
        let issued = issuer
            .issue(1, CodePurpose::SignupVerification, now)
            .await
            .unwrap();

        let later = now + Duration::hours(2);
        assert!(matches!(
            issuer.validate(&issued.code, later).await.unwrap(),
            CodeCheck::Expired
        ));
        assert!(matches!(
            issuer.validate("999999999", now).await.unwrap(),
            CodeCheck::Invalid
        ));
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous_code() {
        let issuer = issuer();
        let now = Utc::now();
        let first = issuer
            .issue(3, CodePurpose::SignupVerification, now)
            .await
            .unwrap();
        let second = issuer
            .issue(3, CodePurpose::SignupVerification, now)
            .await
            .unwrap();

        if first.code != second.code {
            assert!(matches!(
                issuer.validate(&first.code, now).await.unwrap(),
                CodeCheck::Invalid
            ));
        }
        assert!(matches!(
            issuer.validate(&second.code, now).await.unwrap(),
            CodeCheck::Valid(_)
        ));
    }

    #[tokio::test]
    async fn test_issue_never_reuses_a_live_code_of_another_user() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        for (n, digit) in CODE_CHARSET.iter().enumerate() {
            let code = (*digit as char).to_string();
            store
                .replace_for_user(100 + n as UserId, &code, now, now + Duration::hours(1))
                .await
                .unwrap();
        }

        let issuer = CodeIssuer::new(store.clone(), 1, Duration::hours(1), Duration::hours(1));
        let result = issuer.issue(1, CodePurpose::SignupVerification, now).await;

        assert!(matches!(result, Err(AuthError::CodeUnavailable)));
        assert_eq!(store.verification_code_count(), CODE_CHARSET.len());
        for n in 0..CODE_CHARSET.len() {
            let code = (CODE_CHARSET[n] as char).to_string();
            let record = store.find_by_code(&code).await.unwrap().unwrap();
            assert_eq!(record.user_id, 100 + n as UserId);
        }
    }

    #[tokio::test]
    async fn test_expired_code_of_another_user_may_be_reissued() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        for (n, digit) in CODE_CHARSET.iter().enumerate() {
            let code = (*digit as char).to_string();
            store
                .replace_for_user(100 + n as UserId, &code, now - Duration::hours(2), now - Duration::hours(1))
                .await
                .unwrap();
        }

        let issuer = CodeIssuer::new(store.clone(), 1, Duration::hours(1), Duration::hours(1));
        let issued = issuer.issue(1, CodePurpose::SignupVerification, now).await.unwrap();

        match issuer.validate(&issued.code, now).await.unwrap() {
            CodeCheck::Valid(record) => assert_eq!(record.user_id, 1),
            other => panic!("expected valid code, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reset_codes_use_their_own_ttl() {
        let store = Arc::new(InMemoryStore::new());
        let issuer = CodeIssuer::new(store.clone(), 6, Duration::hours(1), Duration::minutes(30));
        let now = Utc::now();
        let issued = issuer.issue(1, CodePurpose::PasswordReset, now).await.unwrap();

        assert_eq!(issued.expires_at, now + Duration::minutes(30));
        assert_eq!(store.verification_code_count(), 0);
    }
}
