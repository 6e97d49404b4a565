/*
 * Responsibility
 * - レコードのライフサイクル状態 (State) とロール (Role) の定義
 * - 遷移を許可する (from, to, roles) のエッジテーブル
 * - 状態ごとの「内容編集可否」ポリシー
 */
use serde::{Deserialize, Serialize};

/// Lifecycle state of a registry record.
///
/// Stored in the document under the reserved `state` field as an upper-case
/// string. The set is closed; anything else is a malformed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Draft,
    Active,
    Published,
    Archived,
}

impl State {
    /// State assigned to every newly created record.
    pub const INITIAL: State = State::Draft;

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Draft => "DRAFT",
            State::Active => "ACTIVE",
            State::Published => "PUBLISHED",
            State::Archived => "ARCHIVED",
        }
    }

    pub fn parse(value: &str) -> Option<State> {
        match value {
            "DRAFT" => Some(State::Draft),
            "ACTIVE" => Some(State::Active),
            "PUBLISHED" => Some(State::Published),
            "ARCHIVED" => Some(State::Archived),
            _ => None,
        }
    }

    /// A terminal state has no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        EDGES.iter().all(|edge| edge.from != *self)
    }

    /// Content-frozen states permit state transitions but no attribute
    /// changes (the `state` field itself excepted).
    pub fn content_frozen(&self) -> bool {
        matches!(self, State::Published | State::Archived)
    }
}

/// Roles recognized by the transition table.
///
/// Role claims arrive as free-form strings in the token; anything that does
/// not map onto this enum carries no registry permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Editor,
    Publisher,
    Admin,
}

impl Role {
    pub fn from_claim(claim: &str) -> Option<Role> {
        match claim {
            "editor" => Some(Role::Editor),
            "publisher" => Some(Role::Publisher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

struct Edge {
    from: State,
    to: State,
    roles: &'static [Role],
}

const EDGES: &[Edge] = &[
    Edge {
        from: State::Draft,
        to: State::Active,
        roles: &[Role::Editor, Role::Admin],
    },
    Edge {
        from: State::Active,
        to: State::Draft,
        roles: &[Role::Publisher, Role::Admin],
    },
    Edge {
        from: State::Active,
        to: State::Published,
        roles: &[Role::Publisher, Role::Admin],
    },
    Edge {
        from: State::Draft,
        to: State::Archived,
        roles: &[Role::Admin],
    },
    Edge {
        from: State::Published,
        to: State::Archived,
        roles: &[Role::Admin],
    },
];

/// Whether `role` may traverse the edge `from -> to`.
///
/// Same-state requests are not edges; callers treat them as no-op content
/// updates before consulting the table.
pub fn can_transition(from: State, to: State, role: Role) -> bool {
    EDGES
        .iter()
        .any(|edge| edge.from == from && edge.to == to && edge.roles.contains(&role))
}

/// Whether `role` may change record content while it sits in `state`.
pub fn may_edit(state: State, role: Role) -> bool {
    match state {
        State::Draft => matches!(role, Role::Editor | Role::Admin),
        State::Active => matches!(role, Role::Publisher | Role::Admin),
        State::Published | State::Archived => false,
    }
}
