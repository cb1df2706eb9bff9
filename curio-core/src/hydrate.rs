//! Relation hydration and media URL rewriting.
//!
//! The executor returns flat entity pages; hydration fills the relation
//! vectors in concurrent batch loads, one query per relation for the
//! whole page. Junction targets are over-selected by bare owner id and
//! re-matched against composite keys in Rust, so a junction row from
//! another instance never attaches to the wrong owner. Junction rows
//! whose target is gone from the mirror drop out silently (the join is
//! inner); a failed batch load fails the hydration.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use url::form_urlencoded;

use curio_model::{
    Clip, EntityKey, Gallery, Group, Image, InstanceId, Performer, Scene, Studio,
    Tag,
};

use crate::error::Result;

#[derive(Debug)]
pub struct RelationHydrator {
    pool: PgPool,
}

impl RelationHydrator {
    pub fn new(pool: PgPool) -> Self {
        RelationHydrator { pool }
    }

    /// Fills studio, performers, tags, galleries, and groups for a page
    /// of scenes.
    pub async fn hydrate_scenes(&self, scenes: &mut [Scene]) -> Result<()> {
        if scenes.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = scenes.iter().map(|s| s.key.id.clone()).collect();
        let studio_ids: Vec<String> = scenes
            .iter()
            .filter_map(|s| s.studio_key.as_ref().map(|k| k.id.clone()))
            .collect();

        let (performers, tags, galleries, groups, studios) = tokio::try_join!(
            related_rows(&self.pool, SCENE_PERFORMERS_SQL, &ids, related_performer),
            related_rows(&self.pool, SCENE_TAGS_SQL, &ids, related_tag),
            related_rows(&self.pool, SCENE_GALLERIES_SQL, &ids, related_gallery),
            related_rows(&self.pool, SCENE_GROUPS_SQL, &ids, related_group),
            entity_rows(&self.pool, STUDIOS_SQL, &studio_ids, related_studio),
        )?;

        for scene in scenes.iter_mut() {
            scene.performers = collect_for(&scene.key, &performers);
            scene.tags = collect_for(&scene.key, &tags);
            scene.galleries = collect_for(&scene.key, &galleries);
            scene.groups = collect_for(&scene.key, &groups);
            scene.studio = scene.studio_key.as_ref().and_then(|key| {
                studios
                    .iter()
                    .find(|(k, _)| k.matches(key))
                    .map(|(_, s)| s.clone())
            });
        }
        Ok(())
    }

    pub async fn hydrate_performers(&self, performers: &mut [Performer]) -> Result<()> {
        if performers.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = performers.iter().map(|p| p.key.id.clone()).collect();
        let tags = related_rows(&self.pool, PERFORMER_TAGS_SQL, &ids, related_tag).await?;
        for performer in performers.iter_mut() {
            performer.tags = collect_for(&performer.key, &tags);
        }
        Ok(())
    }

    pub async fn hydrate_studios(&self, studios: &mut [Studio]) -> Result<()> {
        if studios.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = studios.iter().map(|s| s.key.id.clone()).collect();
        let tags = related_rows(&self.pool, STUDIO_TAGS_SQL, &ids, related_tag).await?;
        for studio in studios.iter_mut() {
            studio.tags = collect_for(&studio.key, &tags);
        }
        Ok(())
    }

    pub async fn hydrate_galleries(&self, galleries: &mut [Gallery]) -> Result<()> {
        if galleries.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = galleries.iter().map(|g| g.key.id.clone()).collect();
        let (performers, tags) = tokio::try_join!(
            related_rows(&self.pool, GALLERY_PERFORMERS_SQL, &ids, related_performer),
            related_rows(&self.pool, GALLERY_TAGS_SQL, &ids, related_tag),
        )?;
        for gallery in galleries.iter_mut() {
            gallery.performers = collect_for(&gallery.key, &performers);
            gallery.tags = collect_for(&gallery.key, &tags);
        }
        Ok(())
    }

    pub async fn hydrate_groups(&self, groups: &mut [Group]) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = groups.iter().map(|g| g.key.id.clone()).collect();
        let tags = related_rows(&self.pool, GROUP_TAGS_SQL, &ids, related_tag).await?;
        for group in groups.iter_mut() {
            group.tags = collect_for(&group.key, &tags);
        }
        Ok(())
    }

    pub async fn hydrate_images(&self, images: &mut [Image]) -> Result<()> {
        if images.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = images.iter().map(|i| i.key.id.clone()).collect();
        let (performers, tags) = tokio::try_join!(
            related_rows(&self.pool, IMAGE_PERFORMERS_SQL, &ids, related_performer),
            related_rows(&self.pool, IMAGE_TAGS_SQL, &ids, related_tag),
        )?;
        for image in images.iter_mut() {
            image.performers = collect_for(&image.key, &performers);
            image.tags = collect_for(&image.key, &tags);
        }
        Ok(())
    }

    pub async fn hydrate_clips(&self, clips: &mut [Clip]) -> Result<()> {
        if clips.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = clips.iter().map(|c| c.key.id.clone()).collect();
        let tags = related_rows(&self.pool, CLIP_TAGS_SQL, &ids, related_tag).await?;
        for clip in clips.iter_mut() {
            clip.tags = collect_for(&clip.key, &tags);
        }
        Ok(())
    }
}

/// Rows keyed by the owning entity: over-selected by bare id, re-matched
/// by the caller with [`EntityKey::matches`].
async fn related_rows<T>(
    pool: &PgPool,
    sql: &'static str,
    owner_ids: &[String],
    map: fn(&PgRow) -> Result<T>,
) -> Result<Vec<(EntityKey, T)>> {
    let rows = sqlx::query(sql)
        .bind(owner_ids)
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| {
            let owner = EntityKey::new(
                row.try_get::<String, _>("owner_id")?,
                InstanceId::new(row.try_get::<String, _>("owner_instance_id")?),
            );
            Ok((owner, map(row)?))
        })
        .collect()
}

/// Entities keyed by their own composite key (for single-valued
/// relations like a scene's studio).
async fn entity_rows<T>(
    pool: &PgPool,
    sql: &'static str,
    ids: &[String],
    map: fn(&PgRow) -> Result<T>,
) -> Result<Vec<(EntityKey, T)>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query(sql).bind(ids).fetch_all(pool).await?;
    rows.iter()
        .map(|row| {
            let key = EntityKey::new(
                row.try_get::<String, _>("id")?,
                InstanceId::new(row.try_get::<String, _>("instance_id")?),
            );
            Ok((key, map(row)?))
        })
        .collect()
}

fn collect_for<T: Clone>(key: &EntityKey, rows: &[(EntityKey, T)]) -> Vec<T> {
    rows.iter()
        .filter(|(owner, _)| owner.matches(key))
        .map(|(_, item)| item.clone())
        .collect()
}

const SCENE_PERFORMERS_SQL: &str =
    "SELECT j.scene_id AS owner_id, j.scene_instance_id AS owner_instance_id, \
            p.id, p.instance_id, p.name, p.details, p.rating, p.external_id, \
            p.image_url, p.created_at \
     FROM scene_performers j \
     JOIN performers p ON p.id = j.performer_id \
      AND (j.performer_instance_id = '' OR p.instance_id = '' \
           OR p.instance_id = j.performer_instance_id) \
     WHERE j.scene_id = ANY($1) ORDER BY p.name";

const SCENE_TAGS_SQL: &str =
    "SELECT j.scene_id AS owner_id, j.scene_instance_id AS owner_instance_id, \
            t.id, t.instance_id, t.name, t.description, t.image_url, t.created_at \
     FROM scene_tags j \
     JOIN tags t ON t.id = j.tag_id \
      AND (j.tag_instance_id = '' OR t.instance_id = '' \
           OR t.instance_id = j.tag_instance_id) \
     WHERE j.scene_id = ANY($1) ORDER BY t.name";

const SCENE_GALLERIES_SQL: &str =
    "SELECT j.scene_id AS owner_id, j.scene_instance_id AS owner_instance_id, \
            g.id, g.instance_id, g.title, g.date, g.rating, g.external_id, \
            g.image_url, g.created_at \
     FROM scene_galleries j \
     JOIN galleries g ON g.id = j.gallery_id \
      AND (j.gallery_instance_id = '' OR g.instance_id = '' \
           OR g.instance_id = j.gallery_instance_id) \
     WHERE j.scene_id = ANY($1)";

const SCENE_GROUPS_SQL: &str =
    "SELECT j.scene_id AS owner_id, j.scene_instance_id AS owner_instance_id, \
            g.id, g.instance_id, g.name, g.date, g.rating, g.external_id, \
            g.image_url, g.created_at \
     FROM scene_groups j \
     JOIN media_groups g ON g.id = j.group_id \
      AND (j.group_instance_id = '' OR g.instance_id = '' \
           OR g.instance_id = j.group_instance_id) \
     WHERE j.scene_id = ANY($1) ORDER BY g.name";

const STUDIOS_SQL: &str =
    "SELECT s.id, s.instance_id, s.name, s.details, s.rating, s.parent_id, \
            s.parent_instance_id, s.external_id, s.image_url, s.created_at \
     FROM studios s WHERE s.id = ANY($1)";

const PERFORMER_TAGS_SQL: &str =
    "SELECT j.performer_id AS owner_id, j.performer_instance_id AS owner_instance_id, \
            t.id, t.instance_id, t.name, t.description, t.image_url, t.created_at \
     FROM performer_tags j \
     JOIN tags t ON t.id = j.tag_id \
      AND (j.tag_instance_id = '' OR t.instance_id = '' \
           OR t.instance_id = j.tag_instance_id) \
     WHERE j.performer_id = ANY($1) ORDER BY t.name";

const STUDIO_TAGS_SQL: &str =
    "SELECT j.studio_id AS owner_id, j.studio_instance_id AS owner_instance_id, \
            t.id, t.instance_id, t.name, t.description, t.image_url, t.created_at \
     FROM studio_tags j \
     JOIN tags t ON t.id = j.tag_id \
      AND (j.tag_instance_id = '' OR t.instance_id = '' \
           OR t.instance_id = j.tag_instance_id) \
     WHERE j.studio_id = ANY($1) ORDER BY t.name";

const GALLERY_PERFORMERS_SQL: &str =
    "SELECT j.gallery_id AS owner_id, j.gallery_instance_id AS owner_instance_id, \
            p.id, p.instance_id, p.name, p.details, p.rating, p.external_id, \
            p.image_url, p.created_at \
     FROM gallery_performers j \
     JOIN performers p ON p.id = j.performer_id \
      AND (j.performer_instance_id = '' OR p.instance_id = '' \
           OR p.instance_id = j.performer_instance_id) \
     WHERE j.gallery_id = ANY($1) ORDER BY p.name";

const GALLERY_TAGS_SQL: &str =
    "SELECT j.gallery_id AS owner_id, j.gallery_instance_id AS owner_instance_id, \
            t.id, t.instance_id, t.name, t.description, t.image_url, t.created_at \
     FROM gallery_tags j \
     JOIN tags t ON t.id = j.tag_id \
      AND (j.tag_instance_id = '' OR t.instance_id = '' \
           OR t.instance_id = j.tag_instance_id) \
     WHERE j.gallery_id = ANY($1) ORDER BY t.name";

const GROUP_TAGS_SQL: &str =
    "SELECT j.group_id AS owner_id, j.group_instance_id AS owner_instance_id, \
            t.id, t.instance_id, t.name, t.description, t.image_url, t.created_at \
     FROM group_tags j \
     JOIN tags t ON t.id = j.tag_id \
      AND (j.tag_instance_id = '' OR t.instance_id = '' \
           OR t.instance_id = j.tag_instance_id) \
     WHERE j.group_id = ANY($1) ORDER BY t.name";

const IMAGE_PERFORMERS_SQL: &str =
    "SELECT j.image_id AS owner_id, j.image_instance_id AS owner_instance_id, \
            p.id, p.instance_id, p.name, p.details, p.rating, p.external_id, \
            p.image_url, p.created_at \
     FROM image_performers j \
     JOIN performers p ON p.id = j.performer_id \
      AND (j.performer_instance_id = '' OR p.instance_id = '' \
           OR p.instance_id = j.performer_instance_id) \
     WHERE j.image_id = ANY($1) ORDER BY p.name";

const IMAGE_TAGS_SQL: &str =
    "SELECT j.image_id AS owner_id, j.image_instance_id AS owner_instance_id, \
            t.id, t.instance_id, t.name, t.description, t.image_url, t.created_at \
     FROM image_tags j \
     JOIN tags t ON t.id = j.tag_id \
      AND (j.tag_instance_id = '' OR t.instance_id = '' \
           OR t.instance_id = j.tag_instance_id) \
     WHERE j.image_id = ANY($1) ORDER BY t.name";

const CLIP_TAGS_SQL: &str =
    "SELECT j.clip_id AS owner_id, j.clip_instance_id AS owner_instance_id, \
            t.id, t.instance_id, t.name, t.description, t.image_url, t.created_at \
     FROM clip_tags j \
     JOIN tags t ON t.id = j.tag_id \
      AND (j.tag_instance_id = '' OR t.instance_id = '' \
           OR t.instance_id = j.tag_instance_id) \
     WHERE j.clip_id = ANY($1) ORDER BY t.name";

fn entity_key(row: &PgRow) -> Result<EntityKey> {
    Ok(EntityKey::new(
        row.try_get::<String, _>("id")?,
        InstanceId::new(row.try_get::<String, _>("instance_id")?),
    ))
}

fn related_performer(row: &PgRow) -> Result<Performer> {
    Ok(Performer {
        key: entity_key(row)?,
        name: row.try_get("name")?,
        details: row.try_get("details")?,
        rating: row.try_get("rating")?,
        external_id: row.try_get("external_id")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        ..Default::default()
    })
}

fn related_tag(row: &PgRow) -> Result<Tag> {
    Ok(Tag {
        key: entity_key(row)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        ..Default::default()
    })
}

fn related_studio(row: &PgRow) -> Result<Studio> {
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let parent_instance: Option<String> = row.try_get("parent_instance_id")?;
    Ok(Studio {
        key: entity_key(row)?,
        name: row.try_get("name")?,
        details: row.try_get("details")?,
        rating: row.try_get("rating")?,
        parent_key: parent_id.map(|id| {
            EntityKey::new(id, InstanceId::new(parent_instance.unwrap_or_default()))
        }),
        external_id: row.try_get("external_id")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        ..Default::default()
    })
}

fn related_gallery(row: &PgRow) -> Result<Gallery> {
    Ok(Gallery {
        key: entity_key(row)?,
        title: row.try_get("title")?,
        date: row.try_get("date")?,
        rating: row.try_get("rating")?,
        external_id: row.try_get("external_id")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        ..Default::default()
    })
}

fn related_group(row: &PgRow) -> Result<Group> {
    Ok(Group {
        key: entity_key(row)?,
        name: row.try_get("name")?,
        date: row.try_get("date")?,
        rating: row.try_get("rating")?,
        external_id: row.try_get("external_id")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        ..Default::default()
    })
}

/// Rewrites upstream media URLs to the local streaming proxy, carrying
/// the source instance so the proxy can pick credentials.
#[derive(Debug, Clone)]
pub struct ProxyRewriter {
    proxy_path: String,
}

impl ProxyRewriter {
    pub fn new(proxy_path: impl Into<String>) -> Self {
        ProxyRewriter {
            proxy_path: proxy_path.into(),
        }
    }

    pub fn rewrite(&self, raw_url: &str, instance: &InstanceId) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("url", raw_url);
        if !instance.is_legacy() {
            query.append_pair("instance", instance.as_str());
        }
        format!("{}?{}", self.proxy_path, query.finish())
    }

    fn rewrite_opt(&self, url: &mut Option<String>, instance: &InstanceId) {
        if let Some(raw) = url.take() {
            *url = Some(self.rewrite(&raw, instance));
        }
    }

    /// Rewrites every media URL a hydrated scene carries, its own and
    /// those of its attached relations.
    pub fn rewrite_scene(&self, scene: &mut Scene) {
        let instance = scene.key.instance.clone();
        self.rewrite_opt(&mut scene.screenshot_url, &instance);
        self.rewrite_opt(&mut scene.preview_url, &instance);
        self.rewrite_opt(&mut scene.stream_url, &instance);
        if let Some(studio) = &mut scene.studio {
            let inst = studio.key.instance.clone();
            self.rewrite_opt(&mut studio.image_url, &inst);
        }
        self.rewrite_performers(&mut scene.performers);
        self.rewrite_tags(&mut scene.tags);
        self.rewrite_galleries(&mut scene.galleries);
        self.rewrite_groups(&mut scene.groups);
    }

    pub fn rewrite_scenes(&self, scenes: &mut [Scene]) {
        for scene in scenes {
            self.rewrite_scene(scene);
        }
    }

    pub fn rewrite_performer(&self, performer: &mut Performer) {
        let instance = performer.key.instance.clone();
        self.rewrite_opt(&mut performer.image_url, &instance);
        self.rewrite_tags(&mut performer.tags);
    }

    pub fn rewrite_performers(&self, performers: &mut [Performer]) {
        for performer in performers {
            self.rewrite_performer(performer);
        }
    }

    pub fn rewrite_studio(&self, studio: &mut Studio) {
        let instance = studio.key.instance.clone();
        self.rewrite_opt(&mut studio.image_url, &instance);
        self.rewrite_tags(&mut studio.tags);
    }

    pub fn rewrite_studios(&self, studios: &mut [Studio]) {
        for studio in studios {
            self.rewrite_studio(studio);
        }
    }

    pub fn rewrite_tag(&self, tag: &mut Tag) {
        let instance = tag.key.instance.clone();
        self.rewrite_opt(&mut tag.image_url, &instance);
    }

    pub fn rewrite_tags(&self, tags: &mut [Tag]) {
        for tag in tags {
            self.rewrite_tag(tag);
        }
    }

    pub fn rewrite_gallery(&self, gallery: &mut Gallery) {
        let instance = gallery.key.instance.clone();
        self.rewrite_opt(&mut gallery.image_url, &instance);
        self.rewrite_performers(&mut gallery.performers);
        self.rewrite_tags(&mut gallery.tags);
    }

    pub fn rewrite_galleries(&self, galleries: &mut [Gallery]) {
        for gallery in galleries {
            self.rewrite_gallery(gallery);
        }
    }

    pub fn rewrite_group(&self, group: &mut Group) {
        let instance = group.key.instance.clone();
        self.rewrite_opt(&mut group.image_url, &instance);
        self.rewrite_tags(&mut group.tags);
    }

    pub fn rewrite_groups(&self, groups: &mut [Group]) {
        for group in groups {
            self.rewrite_group(group);
        }
    }

    pub fn rewrite_image(&self, image: &mut Image) {
        let instance = image.key.instance.clone();
        self.rewrite_opt(&mut image.image_url, &instance);
        self.rewrite_performers(&mut image.performers);
        self.rewrite_tags(&mut image.tags);
    }

    pub fn rewrite_images(&self, images: &mut [Image]) {
        for image in images {
            self.rewrite_image(image);
        }
    }

    pub fn rewrite_clip(&self, clip: &mut Clip) {
        let instance = clip.key.instance.clone();
        self.rewrite_opt(&mut clip.video_url, &instance);
        self.rewrite_tags(&mut clip.tags);
    }

    pub fn rewrite_clips(&self, clips: &mut [Clip]) {
        for clip in clips {
            self.rewrite_clip(clip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_urls_encode_source_and_instance() {
        let rewriter = ProxyRewriter::new("/proxy/media");
        let out = rewriter.rewrite(
            "https://alpha.example/scene/1/stream?apikey=k&x=a b",
            &InstanceId::new("alpha"),
        );
        assert!(out.starts_with("/proxy/media?url="));
        assert!(out.contains("instance=alpha"));
        assert!(!out.contains("apikey=k&"));
        assert!(out.contains("a+b") || out.contains("a%20b"));
    }

    #[test]
    fn legacy_rows_omit_the_instance_parameter() {
        let rewriter = ProxyRewriter::new("/proxy/media");
        let out = rewriter.rewrite("https://x/y.jpg", &InstanceId::legacy());
        assert!(!out.contains("instance="));
    }

    #[test]
    fn hydrated_relation_urls_are_proxied_too() {
        let rewriter = ProxyRewriter::new("/proxy/media");
        let mut scene = Scene {
            key: EntityKey::new("1", "alpha"),
            stream_url: Some("https://alpha.example/s/1?apikey=secret".into()),
            studio: Some(Studio {
                key: EntityKey::new("st", "alpha"),
                image_url: Some("https://alpha.example/st.jpg?apikey=secret".into()),
                ..Default::default()
            }),
            tags: vec![Tag {
                key: EntityKey::new("t", "alpha"),
                image_url: Some("https://alpha.example/t.jpg?apikey=secret".into()),
                ..Default::default()
            }],
            galleries: vec![Gallery {
                key: EntityKey::new("g", "alpha"),
                image_url: Some("https://alpha.example/g.jpg?apikey=secret".into()),
                ..Default::default()
            }],
            groups: vec![Group {
                key: EntityKey::new("gr", "alpha"),
                image_url: Some("https://alpha.example/gr.jpg?apikey=secret".into()),
                ..Default::default()
            }],
            ..Default::default()
        };

        rewriter.rewrite_scene(&mut scene);

        for url in [
            scene.stream_url.as_deref(),
            scene.studio.as_ref().and_then(|s| s.image_url.as_deref()),
            scene.tags[0].image_url.as_deref(),
            scene.galleries[0].image_url.as_deref(),
            scene.groups[0].image_url.as_deref(),
        ] {
            let url = url.unwrap();
            assert!(url.starts_with("/proxy/media?url="), "raw url leaked: {url}");
        }
    }

    #[test]
    fn every_kind_has_a_rewrite_entry_point() {
        let rewriter = ProxyRewriter::new("/proxy/media");

        let mut performer = Performer {
            key: EntityKey::new("p", "alpha"),
            image_url: Some("https://alpha.example/p.jpg".into()),
            ..Default::default()
        };
        rewriter.rewrite_performer(&mut performer);
        assert!(performer.image_url.unwrap().starts_with("/proxy/media?url="));

        let mut image = Image {
            key: EntityKey::new("i", "alpha"),
            image_url: Some("https://alpha.example/i.jpg".into()),
            performers: vec![Performer {
                key: EntityKey::new("p", "alpha"),
                image_url: Some("https://alpha.example/p.jpg".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        rewriter.rewrite_image(&mut image);
        assert!(image.image_url.unwrap().starts_with("/proxy/media?url="));
        assert!(image.performers[0]
            .image_url
            .as_deref()
            .unwrap()
            .starts_with("/proxy/media?url="));

        let mut clip = Clip {
            key: EntityKey::new("c", "alpha"),
            video_url: Some("https://alpha.example/c.mp4".into()),
            ..Default::default()
        };
        rewriter.rewrite_clip(&mut clip);
        let video = clip.video_url.unwrap();
        assert!(video.starts_with("/proxy/media?url="));
        assert!(video.contains("instance=alpha"));
    }

    #[test]
    fn related_rows_attach_by_composite_key() {
        let alpha = EntityKey::new("1", "alpha");
        let beta = EntityKey::new("1", "beta");
        let rows = vec![
            (alpha.clone(), "tag-on-alpha"),
            (beta.clone(), "tag-on-beta"),
            (EntityKey::legacy("1"), "tag-on-legacy"),
        ];
        assert_eq!(collect_for(&alpha, &rows), vec!["tag-on-alpha", "tag-on-legacy"]);
        assert_eq!(collect_for(&beta, &rows), vec!["tag-on-beta", "tag-on-legacy"]);
        assert!(collect_for(&EntityKey::new("2", "alpha"), &rows).is_empty());
    }
}
