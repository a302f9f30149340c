//! The tracker's entity types.
//!
//! Each type is a static [`EntityType`] descriptor: its reference policy
//! (which nested types are sent as a scalar reference), suppressed fields,
//! identity fields and the typed field-accessor table used by the
//! collection algebra. The descriptors carry no per-instance state; an
//! [`Entity`] borrows one for its whole life.

use crate::builder::{ElementHandler, HandlerSet};
use crate::entity::{Entity, EntityType};
use crate::list::Resolved;

/// An issue: the central record of the tracker.
///
/// Nested constants (priority, status, type, resolution) are sent as their
/// `id`, users as their `name`, and the project as its `key`. Fields the
/// server refuses on update (or that only exist client-side) are
/// suppressed from wire encoding.
pub static ISSUE: EntityType = EntityType {
    name: "Issue",
    refs: &[
        ("IssueType", "id"),
        ("Status", "id"),
        ("User", "name"),
        ("Project", "key"),
        ("Priority", "id"),
        ("Resolution", "id"),
    ],
    no_send: &[
        "customFieldValues",
        "link",
        "voters",
        "subTasks",
        "parentTask",
        "attachments",
        "comments",
    ],
    identity: &["id", "key"],
    accessors: &[
        ("id", issue_id),
        ("key", issue_key),
        ("summary", issue_summary),
        ("description", issue_description),
        ("environment", issue_environment),
        ("link", issue_link),
        ("votes", issue_votes),
        ("created", issue_created),
        ("updated", issue_updated),
        ("duedate", issue_duedate),
        ("priority", issue_priority),
        ("status", issue_status),
        ("type", issue_type),
        ("resolution", issue_resolution),
        ("assignee", issue_assignee),
        ("reporter", issue_reporter),
        ("project", issue_project),
        ("parentTask", issue_parent_task),
        ("comments", issue_comments),
        ("components", issue_components),
        ("fixVersions", issue_fix_versions),
        ("affectsVersions", issue_affects_versions),
        ("subTasks", issue_sub_tasks),
        ("attachments", issue_attachments),
        ("voters", issue_voters),
        ("customFieldValues", issue_custom_field_values),
    ],
};

fn issue_id(e: &Entity) -> Resolved {
    e.int_value("id")
}

fn issue_key(e: &Entity) -> Resolved {
    e.text_value("key")
}

fn issue_summary(e: &Entity) -> Resolved {
    e.text_value("summary")
}

fn issue_description(e: &Entity) -> Resolved {
    e.text_value("description")
}

fn issue_environment(e: &Entity) -> Resolved {
    e.text_value("environment")
}

fn issue_link(e: &Entity) -> Resolved {
    e.text_value("link")
}

/// Vote count: the populated voter list when one is present, the feed's
/// plain counter otherwise.
fn issue_votes(e: &Entity) -> Resolved {
    if e.has_field("voters") {
        match e.peek_entity_list("voters", &USER) {
            Some(list) => Resolved::Int(list.len() as i64),
            None => Resolved::Null,
        }
    } else {
        e.int_value("votes")
    }
}

fn issue_created(e: &Entity) -> Resolved {
    e.date_value("created")
}

fn issue_updated(e: &Entity) -> Resolved {
    e.date_value("updated")
}

fn issue_duedate(e: &Entity) -> Resolved {
    e.date_value("duedate")
}

fn issue_priority(e: &Entity) -> Resolved {
    e.entity_value("priority", &PRIORITY)
}

fn issue_status(e: &Entity) -> Resolved {
    e.entity_value("status", &STATUS)
}

fn issue_type(e: &Entity) -> Resolved {
    e.entity_value("type", &ISSUE_TYPE)
}

fn issue_resolution(e: &Entity) -> Resolved {
    e.entity_value("resolution", &RESOLUTION)
}

fn issue_assignee(e: &Entity) -> Resolved {
    e.entity_value("assignee", &USER)
}

fn issue_reporter(e: &Entity) -> Resolved {
    e.entity_value("reporter", &USER)
}

fn issue_project(e: &Entity) -> Resolved {
    e.entity_value("project", &PROJECT)
}

fn issue_parent_task(e: &Entity) -> Resolved {
    e.entity_value("parentTask", &ISSUE)
}

fn issue_comments(e: &Entity) -> Resolved {
    e.list_value("comments", &COMMENT)
}

fn issue_components(e: &Entity) -> Resolved {
    e.list_value("components", &COMPONENT)
}

fn issue_fix_versions(e: &Entity) -> Resolved {
    e.list_value("fixVersions", &VERSION)
}

fn issue_affects_versions(e: &Entity) -> Resolved {
    e.list_value("affectsVersions", &VERSION)
}

fn issue_sub_tasks(e: &Entity) -> Resolved {
    e.list_value("subTasks", &ISSUE)
}

fn issue_attachments(e: &Entity) -> Resolved {
    e.list_value("attachments", &ATTACHMENT)
}

fn issue_voters(e: &Entity) -> Resolved {
    e.list_value("voters", &USER)
}

fn issue_custom_field_values(e: &Entity) -> Resolved {
    e.list_value("customFieldValues", &CUSTOM_FIELD_VALUE)
}

/// The tracker's enumerated constants (priority, status, resolution, issue
/// type) all share one field shape.
macro_rules! constant_type {
    ($name:literal) => {
        EntityType {
            name: $name,
            refs: &[],
            no_send: &[],
            identity: &["id", "name"],
            accessors: &[
                ("id", constant_id),
                ("name", constant_name),
                ("description", constant_description),
                ("icon", constant_icon),
            ],
        }
    };
}

pub static PRIORITY: EntityType = constant_type!("Priority");
pub static STATUS: EntityType = constant_type!("Status");
pub static RESOLUTION: EntityType = constant_type!("Resolution");
pub static ISSUE_TYPE: EntityType = constant_type!("IssueType");

fn constant_id(e: &Entity) -> Resolved {
    e.int_value("id")
}

fn constant_name(e: &Entity) -> Resolved {
    e.text_value("name")
}

fn constant_description(e: &Entity) -> Resolved {
    e.text_value("description")
}

fn constant_icon(e: &Entity) -> Resolved {
    e.text_value("icon")
}

pub static USER: EntityType = EntityType {
    name: "User",
    refs: &[],
    no_send: &[],
    identity: &["name"],
    accessors: &[
        ("name", user_name),
        ("fullname", user_fullname),
        ("email", user_email),
    ],
};

fn user_name(e: &Entity) -> Resolved {
    e.text_value("name")
}

fn user_fullname(e: &Entity) -> Resolved {
    e.text_value("fullname")
}

fn user_email(e: &Entity) -> Resolved {
    e.text_value("email")
}

pub static PROJECT: EntityType = EntityType {
    name: "Project",
    refs: &[],
    no_send: &[],
    identity: &["id", "key"],
    accessors: &[
        ("id", project_id),
        ("key", project_key),
        ("name", project_name),
        ("url", project_url),
        ("projectUrl", project_project_url),
        ("lead", project_lead),
        ("description", project_description),
    ],
};

fn project_id(e: &Entity) -> Resolved {
    e.int_value("id")
}

fn project_key(e: &Entity) -> Resolved {
    e.text_value("key")
}

fn project_name(e: &Entity) -> Resolved {
    e.text_value("name")
}

fn project_url(e: &Entity) -> Resolved {
    e.text_value("url")
}

fn project_project_url(e: &Entity) -> Resolved {
    e.text_value("projectUrl")
}

fn project_lead(e: &Entity) -> Resolved {
    e.text_value("lead")
}

fn project_description(e: &Entity) -> Resolved {
    e.text_value("description")
}

pub static VERSION: EntityType = EntityType {
    name: "Version",
    refs: &[],
    no_send: &[],
    identity: &["id", "name"],
    accessors: &[
        ("id", version_id),
        ("name", version_name),
        ("released", version_released),
        ("archived", version_archived),
        ("releaseDate", version_release_date),
        ("sequence", version_sequence),
    ],
};

fn version_id(e: &Entity) -> Resolved {
    e.int_value("id")
}

fn version_name(e: &Entity) -> Resolved {
    e.text_value("name")
}

fn version_released(e: &Entity) -> Resolved {
    e.bool_value("released")
}

fn version_archived(e: &Entity) -> Resolved {
    e.bool_value("archived")
}

fn version_release_date(e: &Entity) -> Resolved {
    e.date_value("releaseDate")
}

fn version_sequence(e: &Entity) -> Resolved {
    e.int_value("sequence")
}

pub static COMPONENT: EntityType = EntityType {
    name: "Component",
    refs: &[],
    no_send: &[],
    identity: &["id", "name"],
    accessors: &[("id", component_id), ("name", component_name)],
};

fn component_id(e: &Entity) -> Resolved {
    e.int_value("id")
}

fn component_name(e: &Entity) -> Resolved {
    e.text_value("name")
}

pub static COMMENT: EntityType = EntityType {
    name: "Comment",
    refs: &[],
    no_send: &[],
    identity: &["id"],
    accessors: &[
        ("id", comment_id),
        ("body", comment_body),
        ("username", comment_username),
        ("timePerformed", comment_time_performed),
    ],
};

// Comment ids are opaque strings on the wire, not numbers.
fn comment_id(e: &Entity) -> Resolved {
    e.text_value("id")
}

fn comment_body(e: &Entity) -> Resolved {
    e.text_value("body")
}

fn comment_username(e: &Entity) -> Resolved {
    e.text_value("username")
}

fn comment_time_performed(e: &Entity) -> Resolved {
    e.date_value("timePerformed")
}

pub static ATTACHMENT: EntityType = EntityType {
    name: "Attachment",
    refs: &[],
    no_send: &[],
    identity: &["id"],
    accessors: &[
        ("id", attachment_id),
        ("fileName", attachment_file_name),
        ("file", attachment_file),
        ("author", attachment_author),
    ],
};

fn attachment_id(e: &Entity) -> Resolved {
    e.int_value("id")
}

fn attachment_file_name(e: &Entity) -> Resolved {
    e.text_value("fileName")
}

fn attachment_file(e: &Entity) -> Resolved {
    e.text_value("file")
}

fn attachment_author(e: &Entity) -> Resolved {
    e.text_value("author")
}

/// A saved search. The owner arrives as a bare username, so the author
/// field promotes through a reference policy.
pub static FILTER: EntityType = EntityType {
    name: "Filter",
    refs: &[("User", "name")],
    no_send: &[],
    identity: &["id", "name"],
    accessors: &[
        ("id", filter_id),
        ("name", filter_name),
        ("description", filter_description),
        ("author", filter_author),
        ("xml", filter_xml),
    ],
};

fn filter_id(e: &Entity) -> Resolved {
    e.int_value("id")
}

fn filter_name(e: &Entity) -> Resolved {
    e.text_value("name")
}

fn filter_description(e: &Entity) -> Resolved {
    e.text_value("description")
}

fn filter_author(e: &Entity) -> Resolved {
    e.entity_value("author", &USER)
}

fn filter_xml(e: &Entity) -> Resolved {
    e.text_value("xml")
}

pub static SERVER_INFO: EntityType = EntityType {
    name: "ServerInfo",
    refs: &[],
    no_send: &[],
    identity: &[],
    accessors: &[
        ("buildNumber", server_info_build_number),
        ("version", server_info_version),
        ("baseUrl", server_info_base_url),
        ("edition", server_info_edition),
        ("buildDate", server_info_build_date),
    ],
};

fn server_info_build_number(e: &Entity) -> Resolved {
    e.int_value("buildNumber")
}

fn server_info_version(e: &Entity) -> Resolved {
    e.text_value("version")
}

fn server_info_base_url(e: &Entity) -> Resolved {
    e.text_value("baseUrl")
}

fn server_info_edition(e: &Entity) -> Resolved {
    e.text_value("edition")
}

fn server_info_build_date(e: &Entity) -> Resolved {
    e.date_value("buildDate")
}

/// A custom field's id and value as carried on an issue.
pub static CUSTOM_FIELD_VALUE: EntityType = EntityType {
    name: "CustomFieldValue",
    refs: &[],
    no_send: &[],
    identity: &["customfieldId"],
    accessors: &[
        ("customfieldId", custom_field_value_id),
        ("key", custom_field_value_key),
    ],
};

fn custom_field_value_id(e: &Entity) -> Resolved {
    e.text_value("customfieldId")
}

fn custom_field_value_key(e: &Entity) -> Resolved {
    e.text_value("key")
}

/// The root of a built feed document; its issues live under `items`.
pub static CHANNEL: EntityType = EntityType {
    name: "Channel",
    refs: &[],
    no_send: &[],
    identity: &[],
    accessors: &[("items", channel_items)],
};

fn channel_items(e: &Entity) -> Resolved {
    e.list_value("items", &ISSUE)
}

/// The element registrations for the tracker's feed dialect.
///
/// `item` elements append issues to the channel's `items` list; constant
/// elements carry their id as an attribute and their name as text; user
/// elements remap the `username` attribute and put the text in `fullname`;
/// everything else is plain text, with `due` renamed to the field the
/// remote API uses.
pub fn feed_handlers() -> HandlerSet {
    let mut handlers = HandlerSet::new();
    handlers.register("item", ElementHandler::entity_list(&ISSUE).no_content());
    handlers.register("priority", ElementHandler::entity(&PRIORITY));
    handlers.register("status", ElementHandler::entity(&STATUS));
    handlers.register("type", ElementHandler::entity(&ISSUE_TYPE));
    handlers.register("resolution", ElementHandler::entity(&RESOLUTION));
    handlers.register("fixVersion", ElementHandler::entity_list(&VERSION));
    handlers.register("affectsVersion", ElementHandler::entity_list(&VERSION));
    handlers.register("component", ElementHandler::entity_list(&COMPONENT));
    handlers.register("assignee", user_element());
    handlers.register("reporter", user_element());
    handlers.register(
        "comment",
        ElementHandler::entity_list(&COMMENT)
            .clear_attrs()
            .with_attr("author", "username")
            .with_attr("created", "timePerformed")
            .with_content_field("body")
            .strip_markup(),
    );
    for tag in [
        "title",
        "link",
        "description",
        "environment",
        "summary",
        "created",
        "updated",
        "votes",
    ] {
        handlers.register(tag, ElementHandler::text());
    }
    handlers.register("due", ElementHandler::text_into("duedate"));
    handlers.register("key", ElementHandler::text().with_attr("id", "id"));
    handlers
}

fn user_element() -> ElementHandler {
    ElementHandler::entity(&USER)
        .clear_attrs()
        .with_attr("username", "name")
        .with_content_field("fullname")
}

/// The feed never carries the project; derive it from the issue key's
/// prefix. The bare string later promotes to a full project through the
/// issue's reference policy.
pub fn fill_project_from_key(issue: &mut Entity) {
    let project = issue
        .get_string("key")
        .and_then(|key| key.split_once('-'))
        .map(|(prefix, _)| prefix.to_string());
    if let Some(project) = project {
        issue.set_string("project", project);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawValue;
    use serde_json::json;

    fn issue_from(json: serde_json::Value) -> Entity {
        Entity::from_raw(&ISSUE, RawValue::from_json(json)).unwrap()
    }

    #[test]
    fn test_votes_prefers_populated_voter_list() {
        let from_feed = issue_from(json!({"votes": "3"}));
        assert_eq!(from_feed.resolve("votes"), Resolved::Int(3));

        let filled = issue_from(json!({
            "votes": "3",
            "voters": [{"name": "a"}, {"name": "b"}]
        }));
        assert_eq!(filled.resolve("votes"), Resolved::Int(2));
    }

    #[test]
    fn test_project_backfill_promotes_through_reference() {
        let mut issue = issue_from(json!({"id": "1", "key": "PROJ-42"}));
        fill_project_from_key(&mut issue);

        let project = issue.get_entity("project", &PROJECT).unwrap().unwrap();
        assert_eq!(project.get_string("key"), Some("PROJ"));
    }

    #[test]
    fn test_backfill_without_key_is_a_no_op() {
        let mut issue = issue_from(json!({"id": "1"}));
        fill_project_from_key(&mut issue);
        assert!(!issue.has_field("project"));

        let mut keyed_oddly = issue_from(json!({"id": "1", "key": "NODASH"}));
        fill_project_from_key(&mut keyed_oddly);
        assert!(!keyed_oddly.has_field("project"));
    }

    #[test]
    fn test_version_flags_resolve_as_booleans() {
        let version = Entity::from_raw(
            &VERSION,
            RawValue::from_json(json!({"id": "1", "name": "1.0", "released": "true"})),
        )
        .unwrap();

        assert_eq!(version.resolve("released"), Resolved::Bool(true));
        assert_eq!(version.resolve("archived"), Resolved::Bool(false));
    }

    #[test]
    fn test_filter_author_promotes_from_bare_username() {
        let filter = Entity::from_raw(
            &FILTER,
            RawValue::from_json(json!({"id": "9", "name": "mine", "author": "dblevins"})),
        )
        .unwrap();

        match filter.resolve("author") {
            Resolved::Entity(author) => {
                assert_eq!(author.entity_type().name, "User");
                assert_eq!(author.get_string("name"), Some("dblevins"));
            }
            other => panic!("expected a user, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_types_share_field_shape() {
        for ty in [&PRIORITY, &STATUS, &RESOLUTION, &ISSUE_TYPE] {
            assert!(ty.accessor("id").is_some());
            assert!(ty.accessor("name").is_some());
            assert_eq!(ty.identity, &["id", "name"]);
        }
    }

    #[test]
    fn test_every_feed_tag_is_registered() {
        let handlers = feed_handlers();
        for tag in [
            "item",
            "key",
            "summary",
            "priority",
            "status",
            "type",
            "resolution",
            "fixVersion",
            "affectsVersion",
            "component",
            "assignee",
            "reporter",
            "comment",
            "due",
            "votes",
        ] {
            assert!(handlers.get(tag).is_some(), "{} should be handled", tag);
        }
        assert!(handlers.get("channel").is_none());
    }
}
