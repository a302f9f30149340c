//! End-to-end tests: build an entity graph from a feed event stream, query
//! it through the collection algebra, and encode it back to wire form.

use serde_json::json;
use tracklet::model::{self, CHANNEL, ISSUE, PRIORITY, PROJECT, USER, VERSION};
use tracklet::{BuildError, DocumentBuilder, Entity, EntityList, RawValue, Resolved};

struct Tag<'a> {
    name: &'a str,
    attrs: &'a [(&'a str, &'a str)],
    text: &'a str,
}

fn tag<'a>(name: &'a str, text: &'a str) -> Tag<'a> {
    Tag {
        name,
        attrs: &[],
        text,
    }
}

fn emit(builder: &mut DocumentBuilder, tags: &[Tag<'_>]) {
    for t in tags {
        builder.open_tag(t.name, t.attrs);
        if !t.text.is_empty() {
            builder.text(t.text);
        }
        builder.close_tag(t.name).unwrap();
    }
}

/// Stream a small two-issue feed and return the built channel.
fn build_feed() -> Entity {
    let mut builder = DocumentBuilder::new(model::feed_handlers(), &CHANNEL);

    builder.open_tag("rss", &[("version", "2.0")]);
    builder.open_tag("channel", &[]);
    emit(
        &mut builder,
        &[tag("title", "Open issues"), tag("generator", "tracker")],
    );

    builder.open_tag("item", &[]);
    builder.open_tag("key", &[("id", "28093")]);
    builder.text("PROJ-1");
    builder.close_tag("key").unwrap();
    emit(
        &mut builder,
        &[
            tag("summary", "marshalling layer drops nested fields"),
            tag("description", "<p>nested records vanish on update</p>"),
            tag("created", "Tue, 11 Oct 2005 06:10:39 +0000"),
            tag("votes", "3"),
        ],
    );
    builder.open_tag("priority", &[("id", "3")]);
    builder.text("Major");
    builder.close_tag("priority").unwrap();
    builder.open_tag("assignee", &[("username", "dblevins")]);
    builder.text("David Blevins");
    builder.close_tag("assignee").unwrap();
    for (id, name) in [("1", "1.0"), ("2", "1.1")] {
        builder.open_tag("fixVersion", &[("id", id)]);
        builder.text(name);
        builder.close_tag("fixVersion").unwrap();
    }
    builder
        .open_tag("comment", &[("author", "jsmith"), ("created", "Tue, 11 Oct 2005 07:00:00 +0000")]);
    builder.text("<p>reproduced on trunk</p>");
    builder.close_tag("comment").unwrap();
    builder.close_tag("item").unwrap();

    builder.open_tag("item", &[]);
    builder.open_tag("key", &[("id", "28094")]);
    builder.text("PROJ-2");
    builder.close_tag("key").unwrap();
    emit(
        &mut builder,
        &[tag("summary", "sort order unstable"), tag("votes", "1")],
    );
    builder.open_tag("priority", &[("id", "4")]);
    builder.text("Minor");
    builder.close_tag("priority").unwrap();
    builder.close_tag("item").unwrap();

    builder.close_tag("channel").unwrap();
    builder.close_tag("rss").unwrap();
    builder.finish().unwrap()
}

#[test]
fn test_feed_builds_full_entity_graph() {
    let mut channel = build_feed();
    let issues = channel.get_entity_list("items", &ISSUE).unwrap();
    assert_eq!(issues.len(), 2);

    let issue = issues.get_mut(0).unwrap();
    assert_eq!(issue.get_string("id"), Some("28093"));
    assert_eq!(issue.get_string("key"), Some("PROJ-1"));
    assert_eq!(
        issue.get_string("description"),
        Some("nested records vanish on update")
    );
    assert!(!issue.get_date("created").unwrap().is_fallback());

    let priority = issue.get_entity("priority", &PRIORITY).unwrap().unwrap();
    assert_eq!(priority.get_string("id"), Some("3"));
    assert_eq!(priority.get_string("name"), Some("Major"));

    let assignee = issue.get_entity("assignee", &USER).unwrap().unwrap();
    assert_eq!(assignee.get_string("name"), Some("dblevins"));
    assert_eq!(assignee.get_string("fullname"), Some("David Blevins"));

    assert_eq!(issue.get_entity_list("fixVersions", &VERSION).unwrap().len(), 2);

    let comments = issue.get_entity_list("comments", &model::COMMENT).unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].get_string("username"), Some("jsmith"));
    assert_eq!(comments[0].get_string("body"), Some("reproduced on trunk"));
}

#[test]
fn test_project_back_fill_across_the_channel() {
    let mut channel = build_feed();
    let issues = channel.get_entity_list("items", &ISSUE).unwrap();
    for issue in issues.iter_mut() {
        model::fill_project_from_key(issue);
    }

    let issue = issues.get_mut(1).unwrap();
    let project = issue.get_entity("project", &PROJECT).unwrap().unwrap();
    assert_eq!(project.get_string("key"), Some("PROJ"));
}

#[test]
fn test_algebra_over_built_issues() {
    let mut channel = build_feed();
    let issues = channel.get_entity_list("items", &ISSUE).unwrap().clone();

    assert_eq!(issues.sum("votes"), 4);
    assert_eq!(issues.average("votes"), 2);

    let by_votes = issues.descending("votes");
    assert_eq!(by_votes[0].get_string("key"), Some("PROJ-1"));

    let matching = issues.matches("key", "PROJ-\\d+");
    assert_eq!(matching.len(), 2);

    let major = issues.equals("priority", "Major");
    assert_eq!(major.len(), 1);
    assert_eq!(major[0].get_string("key"), Some("PROJ-1"));

    assert_eq!(issues.max("id").unwrap().get_string("key"), Some("PROJ-2"));
}

#[test]
fn test_promoted_graph_round_trips_with_references_collapsed() {
    let mut channel = build_feed();
    let issues = channel.get_entity_list("items", &ISSUE).unwrap();
    let issue = issues.get_mut(0).unwrap();

    // Promote, then encode: the nested priority and assignee collapse to
    // their reference fields; the feed-only link field is suppressed.
    issue.set_url("link", "https://issues.example.org/browse/PROJ-1");
    issue.get_entity("priority", &PRIORITY).unwrap();
    issue.get_entity("assignee", &USER).unwrap();

    let wire = issue.to_wire();
    let record = wire.as_record().unwrap();
    assert_eq!(record.get("priority"), Some(&RawValue::text("3")));
    assert_eq!(record.get("assignee"), Some(&RawValue::text("dblevins")));
    assert!(!record.contains_key("link"));
    assert!(!record.contains_key("comments"));

    // Decoding the encoding and encoding again is a fixed point.
    let rebuilt = Entity::from_raw(&ISSUE, wire.clone()).unwrap();
    assert_eq!(rebuilt.to_wire(), wire);
}

#[test]
fn test_stub_merge_after_fetch() {
    let mut channel = build_feed();
    let issues = channel.get_entity_list("items", &ISSUE).unwrap();
    let stub = issues.get_mut(0).unwrap();

    // A fully-populated record fetched later splices into the feed stub.
    let fetched = Entity::from_raw(
        &ISSUE,
        RawValue::from_json(json!({
            "id": "28093",
            "key": "PROJ-1",
            "environment": "jdk 1.4",
            "votes": "5"
        })),
    )
    .unwrap();
    stub.merge(&fetched);

    assert_eq!(stub.get_string("environment"), Some("jdk 1.4"));
    assert_eq!(stub.resolve("votes"), Resolved::Int(5));
    // Fields only the feed had survive the merge.
    assert_eq!(
        stub.get_string("summary"),
        Some("marshalling layer drops nested fields")
    );
}

#[test]
fn test_set_algebra_on_collected_versions() {
    let mut channel = build_feed();
    let issues = channel.get_entity_list("items", &ISSUE).unwrap().clone();

    let versions = issues.collect("fixVersions").into_entities().unwrap();
    assert_eq!(versions.len(), 2);

    let wanted: EntityList = vec![Entity::from_raw(
        &VERSION,
        RawValue::from_json(json!({"id": "2", "name": "1.1"})),
    )
    .unwrap()]
    .into();

    assert_eq!(versions.intersection(&wanted).len(), 1);
    assert_eq!(versions.subtract(&wanted).len(), 1);
    assert_eq!(versions.union(&wanted), versions);
}

#[test]
fn test_truncated_stream_is_reported() {
    let mut builder = DocumentBuilder::new(model::feed_handlers(), &CHANNEL);
    builder.open_tag("rss", &[]);
    builder.open_tag("item", &[]);
    builder.open_tag("summary", &[]);
    builder.text("cut off mid-");

    assert!(matches!(
        builder.finish(),
        Err(BuildError::UnbalancedDocument { open: 3 })
    ));
}
