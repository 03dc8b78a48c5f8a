use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!("invalid {} '{other}'", $what))),
                }
            }
        }
    };
}

string_enum!(
    /// Kind of calendar work a task represents.
    TaskType, "task type" {
        Assignment => "assignment",
        Exam => "exam",
        Project => "project",
        Meeting => "meeting",
        Study => "study",
        Deadline => "deadline",
        Other => "other",
    }
);

string_enum!(Priority, "priority" {
    High => "high",
    Medium => "medium",
    Low => "low",
});

string_enum!(
    /// Outcome recorded in a sync log row.
    SyncLogStatus, "sync status" {
        Success => "success",
        Failed => "failed",
    }
);

string_enum!(
    /// What started a sync; stored as the log's `sync_type`.
    SyncTrigger, "sync trigger" {
        Login => "login",
        Background => "background",
        Manual => "manual",
        Reset => "reset",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub canvas_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn has_canvas_token(&self) -> bool {
        self.canvas_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Holds the extracted course code for Canvas courses.
    pub professor: Option<String>,
    /// Canvas course id; `None` marks a manually created course.
    pub canvas_course_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Course {
    pub fn is_from_canvas(&self) -> bool {
        self.canvas_course_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub course: Option<String>,
    pub due_date: String,
    pub due_time: Option<String>,
    pub priority: Priority,
    pub completed: bool,
    pub submitted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for inserting a task, whether from sync or from the user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub course: Option<String>,
    pub due_date: String,
    #[serde(default)]
    pub due_time: Option<String>,
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub submitted: bool,
}

/// Partial update of a user-editable task. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    pub course: Option<String>,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self == &TaskUpdate::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncLog {
    pub id: i64,
    pub user_id: i64,
    pub last_sync_at: String,
    pub sync_type: String,
    pub status: SyncLogStatus,
    pub assignments_count: i64,
    pub modules_count: i64,
    pub error_message: Option<String>,
}
