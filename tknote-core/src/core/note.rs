use serde::{Deserialize, Serialize};

/// Lifecycle state of a stored note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NoteState {
    Active,
    Trashed,
}

impl NoteState {
    /// Value stored in the `state` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trashed => "trashed",
        }
    }

    pub(crate) fn from_column(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "trashed" => Some(Self::Trashed),
            _ => None,
        }
    }
}

/// A note as persisted by the [`RecordStore`](super::record_store::RecordStore).
///
/// Timestamps are Unix milliseconds (UTC). `trashed_at` is set only while the
/// note is [`NoteState::Trashed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub state: NoteState,
    pub trashed_at: Option<i64>,
}

impl Note {
    pub fn is_trashed(&self) -> bool {
        self.state == NoteState::Trashed
    }

    /// True when neither the title nor the body contain anything but whitespace.
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }

    /// Label for list views: the title, or the first non-empty body line when
    /// the title is blank.
    pub fn display_title(&self) -> String {
        let title = self.title.trim();
        if !title.is_empty() {
            return title.to_string();
        }
        self.body_lines().next().unwrap_or_default().to_string()
    }

    /// Secondary list line: the first body line not already shown as the title.
    pub fn preview(&self) -> String {
        let skip = usize::from(self.title.trim().is_empty());
        self.body_lines().nth(skip).unwrap_or_default().to_string()
    }

    fn body_lines(&self) -> impl Iterator<Item = &str> {
        self.body.lines().map(str::trim).filter(|line| !line.is_empty())
    }
}
