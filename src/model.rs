use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a closed string enum with `as_str`, `FromStr` and `Display`
/// matching its stored/wire spelling.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "{} must be one of: {} (got {:?})",
                        stringify!($name),
                        [$($text),+].join(", "),
                        other
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }
    };
}

string_enum!(Role {
    SuperAdmin => "superadmin",
    RegionAdmin => "regionadmin",
    SectorAdmin => "sectoradmin",
    SchoolAdmin => "schooladmin",
});

string_enum!(
    /// Approval state of one DataEntry row.
    EntryStatus {
        Draft => "draft",
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

string_enum!(CategoryStatus {
    Active => "active",
    Inactive => "inactive",
    Draft => "draft",
    Archived => "archived",
});

string_enum!(
    /// Who fills a category in: every school, or the sectors themselves.
    Assignment {
        All => "all",
        Sectors => "sectors",
    }
);

string_enum!(ColumnType {
    Text => "text",
    Textarea => "textarea",
    Number => "number",
    Date => "date",
    Select => "select",
    Multiselect => "multiselect",
    Checkbox => "checkbox",
    Radio => "radio",
    Email => "email",
    Phone => "phone",
    Url => "url",
    File => "file",
});

string_enum!(ColumnStatus {
    Active => "active",
    Inactive => "inactive",
    Archived => "archived",
});

string_enum!(EntityStatus {
    Active => "active",
    Inactive => "inactive",
});

string_enum!(TargetKind {
    School => "school",
    Sector => "sector",
});

impl Role {
    pub fn can_approve(self) -> bool {
        matches!(
            self,
            Role::SuperAdmin | Role::RegionAdmin | Role::SectorAdmin
        )
    }

    pub fn manages_categories(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::RegionAdmin)
    }
}

impl EntryStatus {
    /// Allowed edges: draft→pending, pending→approved, pending→rejected,
    /// and approved/rejected→draft when the submitter edits the value.
    pub fn can_transition_to(self, next: EntryStatus) -> bool {
        use EntryStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Draft)
                | (Rejected, Draft)
        )
    }

    /// Whether the submitter may change the stored value.
    pub fn is_editable(self) -> bool {
        self != EntryStatus::Pending
    }
}

impl Assignment {
    pub fn target_kind(self) -> TargetKind {
        match self {
            Assignment::All => TargetKind::School,
            Assignment::Sectors => TargetKind::Sector,
        }
    }
}

/// A school or a sector that data entries are filed against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub kind: TargetKind,
    pub id: String,
}

impl Target {
    pub fn school(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::School,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOption {
    pub label: String,
    pub value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
    Pair { label: String, value: serde_json::Value },
    Bare(String),
}

/// Column options as stored. Anything that is not a JSON list yields an empty
/// list; list items that are neither `{label, value}` nor a string are dropped.
pub fn parse_column_options(raw: Option<&str>) -> Vec<ColumnOption> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Vec::new();
    };
    let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(text) else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawOption>(item).ok())
        .map(|opt| match opt {
            RawOption::Pair { label, value } => ColumnOption {
                label,
                value: match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
            },
            RawOption::Bare(s) => ColumnOption {
                label: s.clone(),
                value: s,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_edges() {
        use EntryStatus::*;
        assert!(Draft.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Draft));
        assert!(Approved.can_transition_to(Draft));

        assert!(!Approved.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Pending));
        assert!(!Draft.can_transition_to(Approved));
        assert!(!Pending.can_transition_to(Draft));
    }

    #[test]
    fn parses_enum_spellings() {
        assert_eq!("SectorAdmin".parse::<Role>(), Ok(Role::SectorAdmin));
        assert_eq!(" pending ".parse::<EntryStatus>(), Ok(EntryStatus::Pending));
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Assignment::Sectors.target_kind(), TargetKind::Sector);
    }

    #[test]
    fn malformed_options_are_empty() {
        assert!(parse_column_options(None).is_empty());
        assert!(parse_column_options(Some("")).is_empty());
        assert!(parse_column_options(Some("{not json")).is_empty());
        assert!(parse_column_options(Some("{\"label\":\"a\"}")).is_empty());
    }

    #[test]
    fn options_accept_pairs_and_strings() {
        let opts = parse_column_options(Some(
            r#"[{"label":"Yes","value":"y"},"Maybe",{"label":"Count","value":3},{"oops":1}]"#,
        ));
        assert_eq!(
            opts,
            vec![
                ColumnOption {
                    label: "Yes".into(),
                    value: "y".into()
                },
                ColumnOption {
                    label: "Maybe".into(),
                    value: "Maybe".into()
                },
                ColumnOption {
                    label: "Count".into(),
                    value: "3".into()
                },
            ]
        );
    }
}
