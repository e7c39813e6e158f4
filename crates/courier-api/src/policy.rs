use courier_types::api::Claims;
use courier_types::models::Message;

use crate::error::ApiError;

/// The authenticated identity must be the named user.
pub fn ensure_correct_user(claims: &Claims, target_username: &str) -> Result<(), ApiError> {
    if claims.sub == target_username {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Read access: the identity must be a party to the message, sender or
/// recipient.
pub fn ensure_message_party(claims: &Claims, message: &Message) -> Result<(), ApiError> {
    if claims.sub == message.from_user.username || claims.sub == message.to_user.username {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Mark-read access: only the recipient may flip a message to read.
pub fn ensure_recipient(claims: &Claims, message: &Message) -> Result<(), ApiError> {
    if claims.sub == message.to_user.username {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_types::models::Contact;
    use uuid::Uuid;

    fn claims(username: &str) -> Claims {
        Claims {
            sub: username.to_owned(),
            exp: 0,
        }
    }

    fn contact(username: &str) -> Contact {
        Contact {
            username: username.to_owned(),
            first_name: "Test".to_owned(),
            last_name: "User".to_owned(),
            phone: "+15550000000".to_owned(),
        }
    }

    fn message(from: &str, to: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            from_user: contact(from),
            to_user: contact(to),
            body: "hello".to_owned(),
            sent_at: Utc::now(),
            read_at: None,
        }
    }

    #[test]
    fn correct_user_check() {
        assert!(ensure_correct_user(&claims("alice"), "alice").is_ok());
        assert!(matches!(
            ensure_correct_user(&claims("alice"), "bob").unwrap_err(),
            ApiError::Forbidden
        ));
    }

    #[test]
    fn both_parties_may_read() {
        let msg = message("alice", "bob");
        assert!(ensure_message_party(&claims("alice"), &msg).is_ok());
        assert!(ensure_message_party(&claims("bob"), &msg).is_ok());
        assert!(matches!(
            ensure_message_party(&claims("mallory"), &msg).unwrap_err(),
            ApiError::Forbidden
        ));
    }

    #[test]
    fn only_the_recipient_may_mark_read() {
        let msg = message("alice", "bob");
        assert!(ensure_recipient(&claims("bob"), &msg).is_ok());
        assert!(matches!(
            ensure_recipient(&claims("alice"), &msg).unwrap_err(),
            ApiError::Forbidden
        ));
        assert!(matches!(
            ensure_recipient(&claims("mallory"), &msg).unwrap_err(),
            ApiError::Forbidden
        ));
    }
}
