//! E-MIS list resources a lookup can page through.

use serde::Serialize;

/// How an item's display label is built from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRule {
    /// Non-empty values of every field, space separated.
    Joined(&'static [&'static str]),
    /// The first field with a non-empty value.
    FirstOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Ranks,
    Positions,
    Units,
    Shtat,
    Persons,
    Courses,
    Competitions,
    News,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Ranks,
        Resource::Positions,
        Resource::Units,
        Resource::Shtat,
        Resource::Persons,
        Resource::Courses,
        Resource::Competitions,
        Resource::News,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Resource::Ranks => "ranks",
            Resource::Positions => "positions",
            Resource::Units => "units",
            Resource::Shtat => "shtat",
            Resource::Persons => "persons",
            Resource::Courses => "courses",
            Resource::Competitions => "competitions",
            Resource::News => "news",
        }
    }

    /// REST collection path under the API base.
    pub fn path(self) -> &'static str {
        match self {
            Resource::Ranks => "ranks",
            Resource::Positions => "positions",
            Resource::Units => "organizations",
            Resource::Shtat => "shtat",
            Resource::Persons => "bio-persons",
            Resource::Courses => "courses",
            Resource::Competitions => "competitions",
            Resource::News => "news",
        }
    }

    pub fn label_rule(self) -> LabelRule {
        match self {
            Resource::Persons => LabelRule::Joined(&["last_name", "first_name", "middle_name"]),
            Resource::News => LabelRule::FirstOf(&["title", "name"]),
            Resource::Shtat => LabelRule::FirstOf(&["name", "position_name", "title"]),
            _ => LabelRule::FirstOf(&["name", "title", "full_name"]),
        }
    }
}
