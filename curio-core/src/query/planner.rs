//! Query planning and execution.
//!
//! A list request lowers into two statements sharing the same FROM/WHERE
//! shape: the data page (with overlay join, ORDER BY, LIMIT/OFFSET) and
//! the total count. Both run concurrently. The count statement skips the
//! overlay and exclusion joins whenever nothing in the request reads
//! them, which is the common case for unfiltered browsing.

use rand::Rng;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::sync::Arc;
use tracing::debug;

use curio_model::{
    Clip, CriterionInput, EntityFilter, EntityKey, EntityKind, Gallery, Group,
    Image, InstanceId, PageRequest, Performer, Scene, SortDirection, SortKey,
    Studio, Tag, UserId, UserOverlay,
};

use crate::error::Result;
use crate::instances::InstanceRegistry;
use crate::query::compile::{self, CompileContext};
use crate::query::hierarchy::Hierarchy;
use crate::query::predicate::{push_fragment, Predicate};
use crate::query::sort::{self, SortExpr};

/// One page of results plus the filtered total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Per-request knobs shared by every kind.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// `None` is an anonymous request: no overlay values, nothing
    /// excluded, every enabled instance visible.
    pub user_id: Option<UserId>,
    pub sort: SortKey,
    pub direction: SortDirection,
    pub page: PageRequest,
    /// Lists honor the user's exclusion overlay by default; direct id
    /// lookups bypass it.
    pub apply_exclusions: bool,
    /// Seed for [`SortKey::Random`]. Callers persist it per view so page
    /// fetches under one shuffle agree on the order.
    pub random_seed: i64,
}

impl QueryOptions {
    pub fn new(user_id: UserId) -> Self {
        QueryOptions {
            user_id: Some(user_id),
            ..Self::anonymous()
        }
    }

    pub fn anonymous() -> Self {
        QueryOptions {
            user_id: None,
            sort: SortKey::CreatedAt,
            direction: SortDirection::Descending,
            page: PageRequest::default(),
            apply_exclusions: true,
            random_seed: rand::rng().random(),
        }
    }
}

/// Executes filtered, sorted, paginated views over the catalog mirror.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    pool: PgPool,
    registry: Arc<InstanceRegistry>,
}

impl QueryEngine {
    pub fn new(pool: PgPool, registry: Arc<InstanceRegistry>) -> Self {
        QueryEngine { pool, registry }
    }

    pub async fn scenes(
        &self,
        filter: &curio_model::SceneFilter,
        opts: &QueryOptions,
    ) -> Result<Page<Scene>> {
        self.fetch_page(
            &EntityFilter::Scene(filter.clone()),
            opts,
            SCENE_SELECT,
            scene_from_row,
        )
        .await
    }

    pub async fn performers(
        &self,
        filter: &curio_model::PerformerFilter,
        opts: &QueryOptions,
    ) -> Result<Page<Performer>> {
        self.fetch_page(
            &EntityFilter::Performer(filter.clone()),
            opts,
            PERFORMER_SELECT,
            performer_from_row,
        )
        .await
    }

    pub async fn studios(
        &self,
        filter: &curio_model::StudioFilter,
        opts: &QueryOptions,
    ) -> Result<Page<Studio>> {
        self.fetch_page(
            &EntityFilter::Studio(filter.clone()),
            opts,
            STUDIO_SELECT,
            studio_from_row,
        )
        .await
    }

    pub async fn tags(
        &self,
        filter: &curio_model::TagFilter,
        opts: &QueryOptions,
    ) -> Result<Page<Tag>> {
        self.fetch_page(
            &EntityFilter::Tag(filter.clone()),
            opts,
            TAG_SELECT,
            tag_from_row,
        )
        .await
    }

    pub async fn galleries(
        &self,
        filter: &curio_model::GalleryFilter,
        opts: &QueryOptions,
    ) -> Result<Page<Gallery>> {
        self.fetch_page(
            &EntityFilter::Gallery(filter.clone()),
            opts,
            GALLERY_SELECT,
            gallery_from_row,
        )
        .await
    }

    pub async fn groups(
        &self,
        filter: &curio_model::GroupFilter,
        opts: &QueryOptions,
    ) -> Result<Page<Group>> {
        self.fetch_page(
            &EntityFilter::Group(filter.clone()),
            opts,
            GROUP_SELECT,
            group_from_row,
        )
        .await
    }

    pub async fn images(
        &self,
        filter: &curio_model::ImageFilter,
        opts: &QueryOptions,
    ) -> Result<Page<Image>> {
        self.fetch_page(
            &EntityFilter::Image(filter.clone()),
            opts,
            IMAGE_SELECT,
            image_from_row,
        )
        .await
    }

    pub async fn clips(
        &self,
        filter: &curio_model::ClipFilter,
        opts: &QueryOptions,
    ) -> Result<Page<Clip>> {
        self.fetch_page(
            &EntityFilter::Clip(filter.clone()),
            opts,
            CLIP_SELECT,
            clip_from_row,
        )
        .await
    }

    /// Direct lookup by composite keys. Bypasses the exclusion overlay
    /// (a user navigating straight to a hidden entity still gets it) but
    /// not instance visibility.
    pub async fn scenes_by_ids(
        &self,
        user_id: Option<UserId>,
        keys: &[EntityKey],
    ) -> Result<Vec<Scene>> {
        self.fetch_by_ids(EntityKind::Scene, user_id, keys, SCENE_SELECT, scene_from_row)
            .await
    }

    pub async fn performers_by_ids(
        &self,
        user_id: Option<UserId>,
        keys: &[EntityKey],
    ) -> Result<Vec<Performer>> {
        self.fetch_by_ids(
            EntityKind::Performer,
            user_id,
            keys,
            PERFORMER_SELECT,
            performer_from_row,
        )
        .await
    }

    pub async fn studios_by_ids(
        &self,
        user_id: Option<UserId>,
        keys: &[EntityKey],
    ) -> Result<Vec<Studio>> {
        self.fetch_by_ids(EntityKind::Studio, user_id, keys, STUDIO_SELECT, studio_from_row)
            .await
    }

    pub async fn tags_by_ids(
        &self,
        user_id: Option<UserId>,
        keys: &[EntityKey],
    ) -> Result<Vec<Tag>> {
        self.fetch_by_ids(EntityKind::Tag, user_id, keys, TAG_SELECT, tag_from_row)
            .await
    }

    pub async fn galleries_by_ids(
        &self,
        user_id: Option<UserId>,
        keys: &[EntityKey],
    ) -> Result<Vec<Gallery>> {
        self.fetch_by_ids(
            EntityKind::Gallery,
            user_id,
            keys,
            GALLERY_SELECT,
            gallery_from_row,
        )
        .await
    }

    pub async fn groups_by_ids(
        &self,
        user_id: Option<UserId>,
        keys: &[EntityKey],
    ) -> Result<Vec<Group>> {
        self.fetch_by_ids(EntityKind::Group, user_id, keys, GROUP_SELECT, group_from_row)
            .await
    }

    pub async fn images_by_ids(
        &self,
        user_id: Option<UserId>,
        keys: &[EntityKey],
    ) -> Result<Vec<Image>> {
        self.fetch_by_ids(EntityKind::Image, user_id, keys, IMAGE_SELECT, image_from_row)
            .await
    }

    pub async fn clips_by_ids(
        &self,
        user_id: Option<UserId>,
        keys: &[EntityKey],
    ) -> Result<Vec<Clip>> {
        self.fetch_by_ids(EntityKind::Clip, user_id, keys, CLIP_SELECT, clip_from_row)
            .await
    }

    async fn fetch_page<T>(
        &self,
        filter: &EntityFilter,
        opts: &QueryOptions,
        select: &'static str,
        map: fn(&PgRow) -> Result<T>,
    ) -> Result<Page<T>> {
        let kind = filter.kind();

        let tag_hierarchy = if needs_tag_hierarchy(filter) {
            Some(Hierarchy::load_tags(&self.pool).await?)
        } else {
            None
        };
        let studio_hierarchy = if needs_studio_hierarchy(filter) {
            Some(Hierarchy::load_studios(&self.pool).await?)
        } else {
            None
        };
        let ctx = CompileContext {
            tag_hierarchy: tag_hierarchy.as_ref(),
            studio_hierarchy: studio_hierarchy.as_ref(),
        };
        let predicate = compile::compile(filter, &ctx)?;

        let allowed = self
            .registry
            .allowed_instance_ids(&self.pool, opts.user_id)
            .await;
        let order = sort::order_by(kind, opts.sort, opts.direction, opts.random_seed);

        let spec = QuerySpec {
            kind,
            user_id: opts.user_id,
            allowed: &allowed,
            predicate: &predicate,
            // An anonymous request has no exclusion overlay to honor.
            apply_exclusions: opts.apply_exclusions && opts.user_id.is_some(),
        };

        let mut data = build_list_query(select, &spec, &order, opts.page);
        // The count can drop both joins when nothing filters through them.
        let count_overlay = compile::filter_uses_overlay(filter);
        let mut count = build_count_query(&spec, count_overlay);
        debug!(kind = kind.as_str(), sql = data.sql(), "executing list query");

        let pool = &self.pool;
        let (rows, total) = tokio::try_join!(
            async move { data.build().fetch_all(pool).await },
            async move {
                count
                    .build_query_scalar::<i64>()
                    .fetch_one(pool)
                    .await
            },
        )?;

        let items = rows.iter().map(map).collect::<Result<Vec<T>>>()?;
        Ok(Page { items, total })
    }

    async fn fetch_by_ids<T>(
        &self,
        kind: EntityKind,
        user_id: Option<UserId>,
        keys: &[EntityKey],
        select: &'static str,
        map: fn(&PgRow) -> Result<T>,
    ) -> Result<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let allowed = self.registry.allowed_instance_ids(&self.pool, user_id).await;
        let mut qb = build_by_ids_query(select, kind, user_id, keys, &allowed);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map).collect()
    }
}

struct QuerySpec<'a> {
    kind: EntityKind,
    user_id: Option<UserId>,
    allowed: &'a [InstanceId],
    predicate: &'a Predicate,
    apply_exclusions: bool,
}

fn wants_expansion(input: Option<&CriterionInput>) -> bool {
    input.and_then(|c| c.depth).is_some_and(|d| d != 0)
}

fn needs_tag_hierarchy(filter: &EntityFilter) -> bool {
    match filter {
        EntityFilter::Scene(f) => wants_expansion(f.tags.as_ref()),
        EntityFilter::Performer(f) => wants_expansion(f.tags.as_ref()),
        EntityFilter::Studio(f) => wants_expansion(f.tags.as_ref()),
        EntityFilter::Tag(_) => false,
        EntityFilter::Gallery(f) => wants_expansion(f.tags.as_ref()),
        EntityFilter::Group(f) => wants_expansion(f.tags.as_ref()),
        EntityFilter::Image(f) => wants_expansion(f.tags.as_ref()),
        EntityFilter::Clip(f) => wants_expansion(f.tags.as_ref()),
    }
}

fn needs_studio_hierarchy(filter: &EntityFilter) -> bool {
    match filter {
        EntityFilter::Scene(f) => wants_expansion(f.studios.as_ref()),
        _ => false,
    }
}

fn push_overlay_join(
    qb: &mut QueryBuilder<'_, Postgres>,
    user_id: Option<UserId>,
    kind: EntityKind,
) {
    // A global '' row and an instance-scoped row can coexist for one
    // entity; the lateral subquery keeps the scoped one so the join
    // never fans out a page row. A NULL user id matches no rows.
    qb.push(
        " LEFT JOIN LATERAL (SELECT * FROM user_entity_overlays ov \
         WHERE ov.user_id = ",
    );
    qb.push_bind(user_id);
    qb.push(" AND ov.entity_kind = ");
    qb.push_bind(kind.as_str());
    qb.push(
        " AND ov.entity_id = e.id \
         AND (ov.instance_id = '' OR e.instance_id = '' OR ov.instance_id = e.instance_id) \
         ORDER BY (ov.instance_id = e.instance_id) DESC LIMIT 1) o ON TRUE",
    );
}

fn push_exclusion_join(
    qb: &mut QueryBuilder<'_, Postgres>,
    user_id: Option<UserId>,
    kind: EntityKind,
) {
    // Anti-join: a matching exclusion row (instance-scoped or the
    // global '' row) knocks the entity out of the list.
    qb.push(" LEFT JOIN user_excluded_entities x ON x.user_id = ");
    qb.push_bind(user_id);
    qb.push(" AND x.entity_kind = ");
    qb.push_bind(kind.as_str());
    qb.push(
        " AND x.entity_id = e.id \
         AND (x.instance_id = '' OR x.instance_id = e.instance_id)",
    );
}

fn push_visibility(qb: &mut QueryBuilder<'_, Postgres>, allowed: &[InstanceId]) {
    // Legacy rows with no instance association stay visible everywhere.
    let allowed: Vec<String> =
        allowed.iter().map(|i| i.as_str().to_string()).collect();
    qb.push(" WHERE (e.instance_id = ANY(");
    qb.push_bind(allowed);
    qb.push(") OR e.instance_id = '')");
}

fn build_list_query(
    select: &str,
    spec: &QuerySpec<'_>,
    order: &SortExpr,
    page: PageRequest,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {select} FROM {table} e",
        table = spec.kind.table()
    ));
    push_overlay_join(&mut qb, spec.user_id, spec.kind);
    if spec.apply_exclusions {
        push_exclusion_join(&mut qb, spec.user_id, spec.kind);
    }
    push_visibility(&mut qb, spec.allowed);
    if spec.apply_exclusions {
        qb.push(" AND x.entity_id IS NULL");
    }
    if !spec.predicate.is_vacuous() {
        qb.push(" AND ");
        spec.predicate.push_to(&mut qb);
    }
    qb.push(" ORDER BY ");
    push_fragment(&mut qb, &order.sql, &order.binds);
    qb.push(" LIMIT ");
    qb.push_bind(page.limit());
    qb.push(" OFFSET ");
    qb.push_bind(page.offset());
    qb
}

fn build_count_query(
    spec: &QuerySpec<'_>,
    needs_overlay: bool,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT COUNT(*) FROM {table} e",
        table = spec.kind.table()
    ));
    if needs_overlay {
        push_overlay_join(&mut qb, spec.user_id, spec.kind);
    }
    if spec.apply_exclusions {
        push_exclusion_join(&mut qb, spec.user_id, spec.kind);
    }
    push_visibility(&mut qb, spec.allowed);
    if spec.apply_exclusions {
        qb.push(" AND x.entity_id IS NULL");
    }
    if !spec.predicate.is_vacuous() {
        qb.push(" AND ");
        spec.predicate.push_to(&mut qb);
    }
    qb
}

fn build_by_ids_query(
    select: &str,
    kind: EntityKind,
    user_id: Option<UserId>,
    keys: &[EntityKey],
    allowed: &[InstanceId],
) -> QueryBuilder<'static, Postgres> {
    let ids: Vec<String> = keys.iter().map(|k| k.id.clone()).collect();
    let instances: Vec<String> = keys
        .iter()
        .map(|k| k.instance.as_str().to_string())
        .collect();

    let mut qb = QueryBuilder::new(format!(
        "SELECT {select} FROM {table} e JOIN unnest(",
        table = kind.table()
    ));
    qb.push_bind(ids);
    qb.push("::text[], ");
    qb.push_bind(instances);
    qb.push(
        "::text[]) AS k(id, instance_id) ON e.id = k.id \
         AND (k.instance_id = '' OR e.instance_id = '' OR e.instance_id = k.instance_id)",
    );
    push_overlay_join(&mut qb, user_id, kind);
    push_visibility(&mut qb, allowed);
    qb
}

#[cfg(test)]
const OVERLAY_SELECT: &str = "o.rating AS user_rating, \
     COALESCE(o.favorite, FALSE) AS user_favorite, \
     COALESCE(o.play_count, 0) AS user_play_count, \
     COALESCE(o.o_count, 0) AS user_o_count, \
     COALESCE(o.view_count, 0) AS user_view_count";

macro_rules! select_list {
    ($($col:literal),+ $(,)?) => {
        concat!("e.id, e.instance_id, ", $($col, ", ",)+
            "o.rating AS user_rating, \
             COALESCE(o.favorite, FALSE) AS user_favorite, \
             COALESCE(o.play_count, 0) AS user_play_count, \
             COALESCE(o.o_count, 0) AS user_o_count, \
             COALESCE(o.view_count, 0) AS user_view_count")
    };
}

const SCENE_SELECT: &str = select_list!(
    "e.title",
    "e.details",
    "e.date",
    "e.rating",
    "e.duration",
    "e.organized",
    "e.created_at",
    "e.studio_id",
    "e.studio_instance_id",
    "e.external_id",
    "e.screenshot_url",
    "e.preview_url",
    "e.stream_url",
    "e.inherited_tag_ids",
);
const PERFORMER_SELECT: &str = select_list!(
    "e.name",
    "e.details",
    "e.rating",
    "e.external_id",
    "e.image_url",
    "e.created_at",
);
const STUDIO_SELECT: &str = select_list!(
    "e.name",
    "e.details",
    "e.rating",
    "e.parent_id",
    "e.parent_instance_id",
    "e.external_id",
    "e.image_url",
    "e.created_at",
);
const TAG_SELECT: &str =
    select_list!("e.name", "e.description", "e.image_url", "e.created_at",);
const GALLERY_SELECT: &str = select_list!(
    "e.title",
    "e.date",
    "e.rating",
    "e.external_id",
    "e.image_url",
    "e.created_at",
);
const GROUP_SELECT: &str = select_list!(
    "e.name",
    "e.date",
    "e.rating",
    "e.external_id",
    "e.image_url",
    "e.created_at",
);
const IMAGE_SELECT: &str =
    select_list!("e.title", "e.date", "e.rating", "e.image_url", "e.created_at",);
const CLIP_SELECT: &str =
    select_list!("e.title", "e.date", "e.rating", "e.video_url", "e.created_at",);

fn key_from_row(row: &PgRow) -> Result<EntityKey> {
    Ok(EntityKey::new(
        row.try_get::<String, _>("id")?,
        InstanceId::new(row.try_get::<String, _>("instance_id")?),
    ))
}

fn overlay_from_row(row: &PgRow) -> Result<UserOverlay> {
    Ok(UserOverlay {
        rating: row.try_get("user_rating")?,
        favorite: row.try_get("user_favorite")?,
        play_count: row.try_get("user_play_count")?,
        o_count: row.try_get("user_o_count")?,
        view_count: row.try_get("user_view_count")?,
    })
}

fn optional_key(
    id: Option<String>,
    instance: Option<String>,
) -> Option<EntityKey> {
    id.map(|id| EntityKey::new(id, InstanceId::new(instance.unwrap_or_default())))
}

fn scene_from_row(row: &PgRow) -> Result<Scene> {
    Ok(Scene {
        key: key_from_row(row)?,
        title: row.try_get("title")?,
        details: row.try_get("details")?,
        date: row.try_get("date")?,
        rating: row.try_get("rating")?,
        duration: row.try_get("duration")?,
        organized: row.try_get("organized")?,
        created_at: row.try_get("created_at")?,
        studio_key: optional_key(
            row.try_get("studio_id")?,
            row.try_get("studio_instance_id")?,
        ),
        external_id: row.try_get("external_id")?,
        screenshot_url: row.try_get("screenshot_url")?,
        preview_url: row.try_get("preview_url")?,
        stream_url: row.try_get("stream_url")?,
        inherited_tag_ids: row
            .try_get::<Option<Vec<String>>, _>("inherited_tag_ids")?
            .unwrap_or_default(),
        overlay: overlay_from_row(row)?,
        ..Default::default()
    })
}

fn performer_from_row(row: &PgRow) -> Result<Performer> {
    Ok(Performer {
        key: key_from_row(row)?,
        name: row.try_get("name")?,
        details: row.try_get("details")?,
        rating: row.try_get("rating")?,
        external_id: row.try_get("external_id")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        overlay: overlay_from_row(row)?,
        ..Default::default()
    })
}

fn studio_from_row(row: &PgRow) -> Result<Studio> {
    Ok(Studio {
        key: key_from_row(row)?,
        name: row.try_get("name")?,
        details: row.try_get("details")?,
        rating: row.try_get("rating")?,
        parent_key: optional_key(
            row.try_get("parent_id")?,
            row.try_get("parent_instance_id")?,
        ),
        external_id: row.try_get("external_id")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        overlay: overlay_from_row(row)?,
        ..Default::default()
    })
}

fn tag_from_row(row: &PgRow) -> Result<Tag> {
    Ok(Tag {
        key: key_from_row(row)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        overlay: overlay_from_row(row)?,
    })
}

fn gallery_from_row(row: &PgRow) -> Result<Gallery> {
    Ok(Gallery {
        key: key_from_row(row)?,
        title: row.try_get("title")?,
        date: row.try_get("date")?,
        rating: row.try_get("rating")?,
        external_id: row.try_get("external_id")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        overlay: overlay_from_row(row)?,
        ..Default::default()
    })
}

fn group_from_row(row: &PgRow) -> Result<Group> {
    Ok(Group {
        key: key_from_row(row)?,
        name: row.try_get("name")?,
        date: row.try_get("date")?,
        rating: row.try_get("rating")?,
        external_id: row.try_get("external_id")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        overlay: overlay_from_row(row)?,
        ..Default::default()
    })
}

fn image_from_row(row: &PgRow) -> Result<Image> {
    Ok(Image {
        key: key_from_row(row)?,
        title: row.try_get("title")?,
        date: row.try_get("date")?,
        rating: row.try_get("rating")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        overlay: overlay_from_row(row)?,
        ..Default::default()
    })
}

fn clip_from_row(row: &PgRow) -> Result<Clip> {
    Ok(Clip {
        key: key_from_row(row)?,
        title: row.try_get("title")?,
        date: row.try_get("date")?,
        rating: row.try_get("rating")?,
        video_url: row.try_get("video_url")?,
        created_at: row.try_get("created_at")?,
        overlay: overlay_from_row(row)?,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::Bind;
    use sqlx::Execute;
    use uuid::Uuid;

    fn spec<'a>(
        predicate: &'a Predicate,
        allowed: &'a [InstanceId],
        apply_exclusions: bool,
    ) -> QuerySpec<'a> {
        QuerySpec {
            kind: EntityKind::Scene,
            user_id: Some(Uuid::nil()),
            allowed,
            predicate,
            apply_exclusions,
        }
    }

    #[test]
    fn list_query_has_joins_visibility_order_and_page() {
        let predicate = Predicate::fragment(
            "COALESCE(o.rating, e.rating, 0) > ?",
            vec![Bind::Float(80.0)],
        );
        let allowed = vec![InstanceId::new("alpha")];
        let order = sort::order_by(
            EntityKind::Scene,
            SortKey::Rating,
            SortDirection::Descending,
            0,
        );
        let page = PageRequest::new(2, 20).unwrap();

        let mut qb =
            build_list_query(SCENE_SELECT, &spec(&predicate, &allowed, true), &order, page);
        let sql = qb.build().sql().to_string();

        assert!(sql.contains("FROM scenes e"));
        assert!(sql.contains("LEFT JOIN LATERAL (SELECT * FROM user_entity_overlays ov"));
        assert!(sql.contains("LEFT JOIN user_excluded_entities x"));
        assert!(sql.contains("x.entity_id IS NULL"));
        assert!(sql.contains("OR e.instance_id = ''"));
        assert!(sql.contains("ORDER BY"));
        assert!(sql.contains("LIMIT"));
        assert!(sql.contains("OFFSET"));
    }

    #[test]
    fn overlay_join_takes_one_row_preferring_the_scoped_one() {
        let predicate = Predicate::none();
        let allowed = vec![InstanceId::new("alpha")];
        let order = sort::order_by(
            EntityKind::Scene,
            SortKey::CreatedAt,
            SortDirection::Descending,
            0,
        );

        let mut qb = build_list_query(
            SCENE_SELECT,
            &spec(&predicate, &allowed, false),
            &order,
            PageRequest::default(),
        );
        let sql = qb.build().sql().to_string();

        // One overlay row per entity even when a global '' row and an
        // instance-scoped row both exist.
        assert!(sql.contains("ORDER BY (ov.instance_id = e.instance_id) DESC LIMIT 1) o ON TRUE"));
        assert_eq!(sql.matches("user_entity_overlays").count(), 1);
    }

    #[test]
    fn anonymous_requests_skip_the_exclusion_join() {
        let predicate = Predicate::none();
        let allowed = vec![InstanceId::new("alpha")];
        let order = sort::order_by(
            EntityKind::Scene,
            SortKey::CreatedAt,
            SortDirection::Descending,
            0,
        );
        let anonymous = QuerySpec {
            kind: EntityKind::Scene,
            user_id: None,
            allowed: &allowed,
            predicate: &predicate,
            apply_exclusions: false,
        };

        let mut qb = build_list_query(
            SCENE_SELECT,
            &anonymous,
            &order,
            PageRequest::default(),
        );
        let sql = qb.build().sql().to_string();

        assert!(!sql.contains("user_excluded_entities"));
    }

    #[test]
    fn count_query_skips_joins_when_nothing_reads_them() {
        let predicate = Predicate::none();
        let allowed = vec![InstanceId::new("alpha")];

        let mut qb = build_count_query(&spec(&predicate, &allowed, false), false);
        let sql = qb.build().sql().to_string();

        assert!(sql.starts_with("SELECT COUNT(*) FROM scenes e WHERE"));
        assert!(!sql.contains("user_entity_overlays"));
        assert!(!sql.contains("user_excluded_entities"));
    }

    #[test]
    fn count_query_keeps_overlay_join_for_overlay_filters() {
        let predicate = Predicate::fragment(
            "COALESCE(o.favorite, FALSE) = ?",
            vec![Bind::Bool(true)],
        );
        let allowed = vec![InstanceId::new("alpha")];

        let mut qb = build_count_query(&spec(&predicate, &allowed, true), true);
        let sql = qb.build().sql().to_string();

        assert!(sql.contains("user_entity_overlays"));
        assert!(sql.contains("user_excluded_entities"));
    }

    #[test]
    fn by_ids_query_bypasses_exclusions() {
        let keys = vec![EntityKey::new("1", "alpha"), EntityKey::legacy("2")];
        let allowed = vec![InstanceId::new("alpha")];
        let mut qb = build_by_ids_query(
            SCENE_SELECT,
            EntityKind::Scene,
            Some(Uuid::nil()),
            &keys,
            &allowed,
        );
        let sql = qb.build().sql().to_string();

        assert!(sql.contains("JOIN unnest("));
        assert!(sql.contains("k.instance_id = '' OR e.instance_id = ''"));
        assert!(!sql.contains("user_excluded_entities"));
    }

    #[test]
    fn select_lists_carry_the_overlay_columns() {
        for select in [
            SCENE_SELECT,
            PERFORMER_SELECT,
            STUDIO_SELECT,
            TAG_SELECT,
            GALLERY_SELECT,
            GROUP_SELECT,
            IMAGE_SELECT,
            CLIP_SELECT,
        ] {
            assert!(select.starts_with("e.id, e.instance_id, "));
            assert!(select.contains(OVERLAY_SELECT));
        }
    }
}
