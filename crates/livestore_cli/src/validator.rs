//! Content rules for notes.

use crate::error::{ServiceResult, ValidationError};
use crate::model::Note;

/// Checks a note's title and content.
///
/// Meant to run inside the write scope that created or changed the note, so
/// a rejection rolls the whole write back.
///
/// # Errors
///
/// Returns [`ValidationError::BlankName`] or [`ValidationError::QuestionMark`]
/// wrapped in a service error, or the error raised while reading the note.
pub fn validate_note(note: &Note) -> ServiceResult<()> {
    check(&note.name()?, &note.content()?)?;
    Ok(())
}

fn check(name: &str, content: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::BlankName);
    }
    if content.contains('?') {
        return Err(ValidationError::QuestionMark);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_notes() {
        assert_eq!(check("Genesis", "Let there be note"), Ok(()));
        assert_eq!(check("?", "title may ask"), Ok(()));
    }

    #[test]
    fn rejects_blank_names() {
        assert_eq!(check("", "body"), Err(ValidationError::BlankName));
        assert_eq!(check(" \t", "body"), Err(ValidationError::BlankName));
    }

    #[test]
    fn rejects_question_marks_in_content() {
        assert_eq!(
            check("Genesis?", "Let there be note?"),
            Err(ValidationError::QuestionMark)
        );
    }
}
