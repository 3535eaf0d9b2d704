use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer-coded membership tag. Membership is the only authorization signal.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Group {
    Student = 1,
    Lecturer = 2,
    Admin = 3,
    ProgramCoordinator = 4,
}

impl Group {
    pub const ALL: [Group; 4] = [
        Group::Student,
        Group::Lecturer,
        Group::Admin,
        Group::ProgramCoordinator,
    ];

    pub fn id(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            Group::Student => "Student",
            Group::Lecturer => "Lecturer",
            Group::Admin => "Admin",
            Group::ProgramCoordinator => "Program Coordinator",
        }
    }
}

impl TryFrom<i64> for Group {
    type Error = Error;

    fn try_from(id: i64) -> Result<Self> {
        Group::ALL
            .into_iter()
            .find(|g| g.id() == id)
            .ok_or_else(|| Error::validation(format!("unknown group id {id}")))
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unordered set of groups. Iteration order carries no meaning.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct GroupSet(BTreeSet<Group>);

impl GroupSet {
    pub fn new() -> Self {
        GroupSet::default()
    }

    /// Build a set from raw ids as delivered by the identity provider,
    /// dropping ids that do not name a known group.
    pub fn from_ids<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        ids.into_iter()
            .filter_map(|id| match Group::try_from(id) {
                Ok(group) => Some(group),
                Err(_) => {
                    warn!(id, "ignoring unrecognized group id");
                    None
                }
            })
            .collect()
    }

    pub fn contains(&self, group: Group) -> bool {
        self.0.contains(&group)
    }

    pub fn insert(&mut self, group: Group) -> bool {
        self.0.insert(group)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Group> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Group> for GroupSet {
    fn from_iter<I: IntoIterator<Item = Group>>(iter: I) -> Self {
        GroupSet(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Group; N]> for GroupSet {
    fn from(groups: [Group; N]) -> Self {
        groups.into_iter().collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub groups: GroupSet,
    pub is_active: bool,
}

impl User {
    pub fn is_in(&self, group: Group) -> bool {
        self.groups.contains(group)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.full_name, self.username)
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub groups: GroupSet,
}

impl NewUser {
    pub fn validate(&self) -> Result<()> {
        validate_identity(&self.username, &self.email)?;
        validate_groups(&self.groups)
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub groups: Option<GroupSet>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn apply_to(self, user: &mut User) -> Result<()> {
        let username = self.username.unwrap_or_else(|| user.username.clone());
        let email = self.email.unwrap_or_else(|| user.email.clone());
        validate_identity(&username, &email)?;
        if let Some(groups) = &self.groups {
            validate_groups(groups)?;
        }
        user.username = username;
        user.email = email;
        if let Some(full_name) = self.full_name {
            user.full_name = full_name;
        }
        if let Some(groups) = self.groups {
            user.groups = groups;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        Ok(())
    }
}

fn validate_identity(username: &str, email: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(Error::validation("username cannot be empty"));
    }
    if !email.contains('@') {
        return Err(Error::validation(format!("invalid e-mail address {email:?}")));
    }
    Ok(())
}

fn validate_groups(groups: &GroupSet) -> Result<()> {
    if groups.is_empty() {
        return Err(Error::validation("a user must belong to at least one group"));
    }
    Ok(())
}
