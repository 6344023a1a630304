#![cfg(feature = "inmem-store")]

use guateabroad::{
    listing::SortMode,
    models::{Category, EducationLevel, NewPost, NewReply, NewUser, ProfileUpdate},
    repo::{inmem::InMemRepo, PostQuery, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use guateabroad::repo::{PostRepo, ReplyRepo, UserRepo};

fn new_user(id: &str, username: &str) -> NewUser {
    NewUser { id: id.into(), email: format!("{username}@example.com"), username: username.into(), email_verified: false }
}

fn new_post(author: &str, title: &str, category: Category) -> NewPost {
    NewPost {
        author_id: author.into(),
        title: title.into(),
        content: "Long enough body text for a forum post about studying abroad.".into(),
        category,
    }
}

fn new_reply(post_id: &str, parent: Option<&str>) -> NewReply {
    NewReply {
        post_id: post_id.into(),
        author_id: "u-1".into(),
        parent_reply_id: parent.map(str::to_string),
        content: "Thanks, that helps a lot!".into(),
    }
}

#[tokio::test]
async fn listing_order_pins_category_and_limit() {
    let r = InMemRepo::new();
    let a = r.create_post(new_post("u-1", "First visa question", Category::Visa)).await.unwrap();
    let b = r.create_post(new_post("u-1", "Scholarship deadline", Category::Scholarships)).await.unwrap();
    let c = r.create_post(new_post("u-1", "Second visa question", Category::Visa)).await.unwrap();

    let ids = |v: Vec<guateabroad::models::PostView>| v.into_iter().map(|p| p.id).collect::<Vec<_>>();

    // newest first
    let all = r.list_posts(PostQuery::default()).await.unwrap();
    assert_eq!(ids(all), vec![c.id.clone(), b.id.clone(), a.id.clone()]);

    // pinned beats recency
    r.set_post_flags(&a.id, true, false).unwrap();
    let all = r.list_posts(PostQuery::default()).await.unwrap();
    assert_eq!(ids(all), vec![a.id.clone(), c.id.clone(), b.id.clone()]);

    let visa = r.list_posts(PostQuery { category: Some(Category::Visa), ..Default::default() }).await.unwrap();
    assert_eq!(ids(visa), vec![a.id.clone(), c.id.clone()]);

    let limited = r.list_posts(PostQuery { limit: Some(1), ..Default::default() }).await.unwrap();
    assert_eq!(limited.len(), 1);

    // popular: views decide among unpinned posts
    r.set_post_flags(&a.id, false, false).unwrap();
    r.increment_view_count(&b.id).await.unwrap();
    r.increment_view_count(&b.id).await.unwrap();
    r.increment_view_count(&a.id).await.unwrap();
    let popular = r.list_posts(PostQuery { sort: SortMode::Popular, ..Default::default() }).await.unwrap();
    assert_eq!(ids(popular), vec![b.id.clone(), a.id.clone(), c.id.clone()]);

    assert_eq!(r.get_post(&b.id).await.unwrap().views, 2);
    assert_eq!(r.increment_view_count("missing").await.unwrap_err(), RepoError::NotFound);
}

#[tokio::test]
async fn replies_count_and_parent_checks() {
    let r = InMemRepo::new();
    let post = r.create_post(new_post("u-1", "Which English test?", Category::Tests)).await.unwrap();
    let other = r.create_post(new_post("u-1", "University rankings", Category::University)).await.unwrap();

    let top = r.create_reply(new_reply(&post.id, None)).await.unwrap();
    let child = r.create_reply(new_reply(&post.id, Some(&top.id))).await.unwrap();
    assert_eq!(child.parent_reply_id.as_deref(), Some(top.id.as_str()));

    let err = r.create_reply(new_reply(&other.id, Some(&top.id))).await.unwrap_err();
    assert_eq!(err, RepoError::InvalidReference("Parent reply does not belong to this post".into()));
    let err = r.create_reply(new_reply(&post.id, Some("nope"))).await.unwrap_err();
    assert!(matches!(err, RepoError::InvalidReference(_)));
    assert_eq!(r.create_reply(new_reply("missing", None)).await.unwrap_err(), RepoError::NotFound);

    assert_eq!(r.get_post_row(&post.id).await.unwrap().reply_count, 2);
    assert_eq!(r.get_post_row(&other.id).await.unwrap().reply_count, 0);

    let listed = r.list_replies(&post.id).await.unwrap();
    assert_eq!(listed.iter().map(|v| v.id.clone()).collect::<Vec<_>>(), vec![top.id.clone(), child.id.clone()]);
    assert_eq!(r.get_reply(&child.id).await.unwrap().post_id, post.id);
}

#[tokio::test]
async fn unknown_author_renders_placeholder() {
    let r = InMemRepo::new();
    let post = r.create_post(new_post("ghost", "Orphaned author post", Category::General)).await.unwrap();
    let view = r.get_post(&post.id).await.unwrap();
    assert_eq!(view.author.username, "unknown");
    assert_eq!(view.author.id, "ghost");

    r.create_user(new_user("u-1", "ana_gt")).await.unwrap();
    r.create_reply(new_reply(&post.id, None)).await.unwrap();
    let replies = r.list_replies(&post.id).await.unwrap();
    assert_eq!(replies[0].author_display_name, "ana_gt");
}

#[tokio::test]
async fn users_and_username_conflicts() {
    let r = InMemRepo::new();
    r.create_user(new_user("u-1", "ana_gt")).await.unwrap();
    r.create_user(new_user("u-2", "luis")).await.unwrap();
    assert_eq!(r.create_user(new_user("u-3", "ana_gt")).await.unwrap_err(), RepoError::Conflict);
    assert_eq!(r.create_user(new_user("u-1", "fresh")).await.unwrap_err(), RepoError::Conflict);

    assert_eq!(r.find_by_username("luis").await.unwrap().unwrap().id, "u-2");
    assert!(r.find_by_username("nobody").await.unwrap().is_none());

    let upd = ProfileUpdate {
        username: "ana".into(),
        bio: Some("Applying for a master's in Spain".into()),
        education_level: Some(EducationLevel::Graduate),
        ..Default::default()
    };
    let ana = r.update_profile("u-1", upd).await.unwrap();
    assert_eq!(ana.username, "ana");
    assert_eq!(ana.education_level, Some(EducationLevel::Graduate));

    let clash = ProfileUpdate { username: "luis".into(), ..Default::default() };
    assert_eq!(r.update_profile("u-1", clash).await.unwrap_err(), RepoError::Conflict);

    let same = ProfileUpdate { username: "ana".into(), ..Default::default() };
    assert!(r.update_profile("u-1", same).await.unwrap().bio.is_none());

    assert!(r.get_user("u-1").await.unwrap().last_login.is_none());
    r.touch_last_login("u-1").await.unwrap();
    assert!(r.get_user("u-1").await.unwrap().last_login.is_some());
    assert_eq!(r.touch_last_login("ghost").await.unwrap_err(), RepoError::NotFound);

    let with_image = r.set_profile_image("u-1", Some("/media/avatars/u-1-1.png".into())).await.unwrap();
    assert_eq!(with_image.profile_image_url.as_deref(), Some("/media/avatars/u-1-1.png"));
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let post_id = {
        let r = InMemRepo::with_snapshot(&path);
        r.create_user(new_user("u-1", "ana_gt")).await.unwrap();
        let post = r.create_post(new_post("u-1", "Persisted forum post", Category::General)).await.unwrap();
        r.create_reply(new_reply(&post.id, None)).await.unwrap();
        post.id
    };
    assert!(path.exists());

    let reopened = InMemRepo::with_snapshot(&path);
    let view = reopened.get_post(&post_id).await.unwrap();
    assert_eq!(view.author.username, "ana_gt");
    assert_eq!(view.replies, 1);
    assert_eq!(reopened.list_replies(&post_id).await.unwrap().len(), 1);

    // garbage on disk starts empty instead of failing
    std::fs::write(&path, b"not json").unwrap();
    let empty = InMemRepo::with_snapshot(&path);
    assert!(empty.list_posts(PostQuery::default()).await.unwrap().is_empty());
}
