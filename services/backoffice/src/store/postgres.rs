//! Postgres-backed implementation of the admin store.
//!
//! # What this module is
//! Implements `AdminStore` over `sqlx::PgPool`. Entity rows live in
//! `resources`, `menus`, `buttons`, `roles` and `users`; many-to-many links
//! live in the `*_resources`, `role_menus` and `role_buttons` join tables.
//!
//! # Key invariants
//! - Every table draws ids from `entity_id_seq`, so ids are never reused.
//! - Row writes and their association replacement share one transaction.
//! - Menu deletes cascade through `parent_id` and `buttons.menu_id`; join
//!   rows cascade with either side.
//! - Menu creates, moves and deletes take one transaction-scoped advisory
//!   lock, so placement checks and subtree collection see a stable tree.
//!
//! # Security notes
//! - Database URLs may contain credentials; avoid logging them.
//! - Dynamic SQL is limited to table/column names from fixed allowlists.
use super::{
    AdminStore, BUTTON_FILTERS, LOGIN_RECORD_FILTERS, ListQuery, MENU_FILTERS, MenuRemoval, Page,
    RESOURCE_FILTERS, ROLE_FILTERS, StoreError, StoreResult, USER_FILTERS, id_set,
};
use crate::auth::rbac::placement::check_placement;
use crate::config::PostgresConfig;
use crate::model::{
    Button, ButtonInput, LoginRecord, Menu, MenuInput, MenuMeta, NewLoginRecord, NewUser, Resource,
    ResourceInput, Role, RoleInput, User, UserAccount, UserPatch,
};
use anyhow::anyhow;
use artweb_authz::{ButtonBinding, MenuBinding, ResourceRule, RoleBinding};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

const RESOURCE_COLUMNS: &str = "id, url, method, label, descr";
const MENU_COLUMNS: &str = "id, path, component, name, title, icon, sort, is_active, descr, parent_id";
const BUTTON_COLUMNS: &str = "id, name, sort, is_active, descr, menu_id";
const ROLE_COLUMNS: &str = "id, name, descr";
const USER_COLUMNS: &str = "id, username, password_hash, is_active, is_staff, role_id";
const LOGIN_RECORD_COLUMNS: &str =
    "id, username, ip_address, user_agent, success, outcome, login_at";

/// `pg_advisory_xact_lock` key guarding the shape of the menu tree.
const MENU_TREE_LOCK: i64 = 0x6d65_6e75;

/// A many-to-many join table: `owner` rows link to `target` rows.
struct LinkTable {
    table: &'static str,
    owner: &'static str,
    target: &'static str,
}

const MENU_RESOURCES: LinkTable = LinkTable {
    table: "menu_resources",
    owner: "menu_id",
    target: "resource_id",
};
const BUTTON_RESOURCES: LinkTable = LinkTable {
    table: "button_resources",
    owner: "button_id",
    target: "resource_id",
};
const ROLE_RESOURCES: LinkTable = LinkTable {
    table: "role_resources",
    owner: "role_id",
    target: "resource_id",
};
const ROLE_MENUS: LinkTable = LinkTable {
    table: "role_menus",
    owner: "role_id",
    target: "menu_id",
};
const ROLE_BUTTONS: LinkTable = LinkTable {
    table: "role_buttons",
    owner: "role_id",
    target: "button_id",
};

pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbResource {
    id: i64,
    url: String,
    method: String,
    label: String,
    descr: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbMenu {
    id: i64,
    path: String,
    component: String,
    name: String,
    title: String,
    icon: String,
    sort: i32,
    is_active: bool,
    descr: String,
    parent_id: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
struct DbButton {
    id: i64,
    name: String,
    sort: i32,
    is_active: bool,
    descr: String,
    menu_id: i64,
}

#[derive(Debug, Clone, FromRow)]
struct DbRole {
    id: i64,
    name: String,
    descr: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: i64,
    username: String,
    password_hash: String,
    is_active: bool,
    is_staff: bool,
    role_id: i64,
}

#[derive(Debug, Clone, FromRow)]
struct DbLoginRecord {
    id: i64,
    username: String,
    ip_address: String,
    user_agent: String,
    success: bool,
    outcome: String,
    login_at: i64,
}

impl TryFrom<DbLoginRecord> for LoginRecord {
    type Error = StoreError;

    fn try_from(row: DbLoginRecord) -> StoreResult<Self> {
        Ok(LoginRecord {
            id: u64::try_from(row.id)
                .map_err(|_| StoreError::Unexpected(anyhow!("login record id {} out of range", row.id)))?,
            username: row.username,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            success: row.success,
            outcome: row.outcome,
            login_at: u64::try_from(row.login_at).unwrap_or_default(),
        })
    }
}

impl PostgresStore {
    /// Connect, apply embedded migrations, and return a ready store.
    ///
    /// # Errors
    /// - Connection, migration, or pool setup failures.
    ///
    /// # Security notes
    /// - Avoid logging `pg.url` as it may contain credentials.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    #[cfg(any(test, feature = "pg-tests"))]
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        // Bound both pool acquisition and physical connects so a dead database
        // surfaces as a startup or health failure instead of a hang.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms.max(
                pg.connect_timeout_ms,
            )))
            .connect_with(connect_options)
            .await?;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }
        Ok(Self { pool })
    }

    async fn links_for(
        &self,
        link: &LinkTable,
        owners: &[i64],
    ) -> StoreResult<HashMap<i64, Vec<u32>>> {
        let sql = format!(
            "SELECT {owner}, {target} FROM {table} WHERE {owner} = ANY($1) ORDER BY {owner}, {target}",
            owner = link.owner,
            target = link.target,
            table = link.table,
        );
        let rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(owners.to_vec())
            .fetch_all(&self.pool)
            .await?;
        group_links(rows)
    }

    async fn all_links(&self, link: &LinkTable) -> StoreResult<HashMap<i64, Vec<u32>>> {
        let sql = format!(
            "SELECT {owner}, {target} FROM {table} ORDER BY {owner}, {target}",
            owner = link.owner,
            target = link.target,
            table = link.table,
        );
        let rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .fetch_all(&self.pool)
            .await?;
        group_links(rows)
    }

    async fn fetch_page<T>(
        &self,
        table: &str,
        columns: &str,
        query: &ListQuery,
        allowed: &[&str],
    ) -> StoreResult<(Vec<T>, u64, ListQuery)>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = query.checked(allowed)?;

        let mut count = QueryBuilder::<Postgres>::new(format!(
            "SELECT COUNT(*) FROM {table} WHERE TRUE"
        ));
        push_filters(&mut count, &query.filters);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {columns} FROM {table} WHERE TRUE"));
        push_filters(&mut select, &query.filters);
        select.push(if query.descending {
            " ORDER BY id DESC"
        } else {
            " ORDER BY id ASC"
        });
        select.push(" LIMIT ");
        select.push_bind(i64::from(query.size));
        select.push(" OFFSET ");
        select.push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
        let rows = select.build_query_as::<T>().fetch_all(&self.pool).await?;

        Ok((rows, u64::try_from(total).unwrap_or_default(), query))
    }

    async fn menus_with_links(&self, rows: Vec<DbMenu>) -> StoreResult<Vec<Menu>> {
        let owners: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut links = self.links_for(&MENU_RESOURCES, &owners).await?;
        rows.into_iter()
            .map(|row| {
                let resource_ids = links.remove(&row.id).unwrap_or_default();
                menu_from_db(row, resource_ids)
            })
            .collect()
    }

    async fn buttons_with_links(&self, rows: Vec<DbButton>) -> StoreResult<Vec<Button>> {
        let owners: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut links = self.links_for(&BUTTON_RESOURCES, &owners).await?;
        rows.into_iter()
            .map(|row| {
                let resource_ids = links.remove(&row.id).unwrap_or_default();
                button_from_db(row, resource_ids)
            })
            .collect()
    }

    async fn roles_with_links(&self, rows: Vec<DbRole>) -> StoreResult<Vec<Role>> {
        let owners: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut resources = self.links_for(&ROLE_RESOURCES, &owners).await?;
        let mut menus = self.links_for(&ROLE_MENUS, &owners).await?;
        let mut buttons = self.links_for(&ROLE_BUTTONS, &owners).await?;
        rows.into_iter()
            .map(|row| {
                Ok(Role {
                    id: to_id(row.id)?,
                    name: row.name,
                    descr: row.descr,
                    resource_ids: resources.remove(&row.id).unwrap_or_default(),
                    menu_ids: menus.remove(&row.id).unwrap_or_default(),
                    button_ids: buttons.remove(&row.id).unwrap_or_default(),
                })
            })
            .collect()
    }
}

async fn replace_links(
    tx: &mut Transaction<'_, Postgres>,
    link: &LinkTable,
    owner: i64,
    targets: &[u32],
) -> StoreResult<()> {
    let delete = format!(
        "DELETE FROM {table} WHERE {owner_col} = $1",
        table = link.table,
        owner_col = link.owner,
    );
    sqlx::query(&delete).bind(owner).execute(&mut **tx).await?;
    if targets.is_empty() {
        return Ok(());
    }
    let insert = format!(
        "INSERT INTO {table} ({owner_col}, {target_col}) SELECT $1, UNNEST($2::BIGINT[])",
        table = link.table,
        owner_col = link.owner,
        target_col = link.target,
    );
    sqlx::query(&insert)
        .bind(owner)
        .bind(to_db_ids(targets))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn current_links(
    tx: &mut Transaction<'_, Postgres>,
    link: &LinkTable,
    owner: i64,
) -> StoreResult<Vec<u32>> {
    let sql = format!(
        "SELECT {target} FROM {table} WHERE {owner_col} = $1 ORDER BY {target}",
        target = link.target,
        table = link.table,
        owner_col = link.owner,
    );
    let rows = sqlx::query_scalar::<_, i64>(&sql)
        .bind(owner)
        .fetch_all(&mut **tx)
        .await?;
    rows.into_iter().map(to_id).collect()
}

/// Replace the association set when `requested` is given, otherwise return
/// the stored one.
async fn sync_links(
    tx: &mut Transaction<'_, Postgres>,
    link: &LinkTable,
    owner: i64,
    requested: Option<&[u32]>,
) -> StoreResult<Vec<u32>> {
    match requested {
        Some(ids) => {
            let ids = id_set(ids);
            replace_links(tx, link, owner, &ids).await?;
            Ok(ids)
        }
        None => current_links(tx, link, owner).await,
    }
}

/// Serialize menu tree edits until `tx` ends.
async fn lock_menu_tree(tx: &mut Transaction<'_, Postgres>) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MENU_TREE_LOCK)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Re-run the placement rules against the committed tree inside `tx`.
async fn check_menu_placement(
    tx: &mut Transaction<'_, Postgres>,
    menu_id: Option<u32>,
    parent_id: Option<u32>,
) -> StoreResult<()> {
    lock_menu_tree(tx).await?;
    if parent_id.is_none() && menu_id.is_none() {
        return Ok(());
    }
    let rows = sqlx::query_as::<_, (i64, Option<i64>)>("SELECT id, parent_id FROM menus")
        .fetch_all(&mut **tx)
        .await?;
    let mut parents = HashMap::with_capacity(rows.len());
    for (id, parent) in rows {
        parents.insert(to_id(id)?, parent.map(to_id).transpose()?);
    }
    check_placement(&parents, menu_id, parent_id)?;
    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &BTreeMap<String, String>) {
    // Keys were checked against the per-table allowlist by `ListQuery::checked`.
    for (column, value) in filters {
        builder.push(format!(" AND {column}::text = "));
        builder.push_bind(value.clone());
    }
}

fn group_links(rows: Vec<(i64, i64)>) -> StoreResult<HashMap<i64, Vec<u32>>> {
    let mut grouped: HashMap<i64, Vec<u32>> = HashMap::new();
    for (owner, target) in rows {
        grouped.entry(owner).or_default().push(to_id(target)?);
    }
    Ok(grouped)
}

fn to_id(value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Unexpected(anyhow!("id {value} out of range")))
}

fn to_db_ids(ids: &[u32]) -> Vec<i64> {
    ids.iter().map(|id| i64::from(*id)).collect()
}

fn resource_from_db(row: DbResource) -> StoreResult<Resource> {
    Ok(Resource {
        id: to_id(row.id)?,
        url: row.url,
        method: row.method,
        label: row.label,
        descr: row.descr,
    })
}

fn menu_from_db(row: DbMenu, resource_ids: Vec<u32>) -> StoreResult<Menu> {
    Ok(Menu {
        id: to_id(row.id)?,
        path: row.path,
        component: row.component,
        name: row.name,
        meta: MenuMeta {
            title: row.title,
            icon: row.icon,
        },
        sort: row.sort,
        is_active: row.is_active,
        descr: row.descr,
        parent_id: row.parent_id.map(to_id).transpose()?,
        resource_ids,
    })
}

fn button_from_db(row: DbButton, resource_ids: Vec<u32>) -> StoreResult<Button> {
    Ok(Button {
        id: to_id(row.id)?,
        name: row.name,
        sort: row.sort,
        is_active: row.is_active,
        descr: row.descr,
        menu_id: to_id(row.menu_id)?,
        resource_ids,
    })
}

fn user_from_db(row: DbUser) -> StoreResult<UserAccount> {
    Ok(UserAccount {
        user: User {
            id: to_id(row.id)?,
            username: row.username,
            is_active: row.is_active,
            is_staff: row.is_staff,
            role_id: to_id(row.role_id)?,
        },
        password_hash: row.password_hash,
    })
}

#[async_trait]
impl AdminStore for PostgresStore {
    // -----------------------------
    // Resources
    // -----------------------------

    async fn create_resource(&self, input: &ResourceInput) -> StoreResult<Resource> {
        let row = sqlx::query_as::<_, DbResource>(&format!(
            "INSERT INTO resources (url, method, label, descr) VALUES ($1, $2, $3, $4) RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(&input.url)
        .bind(&input.method)
        .bind(&input.label)
        .bind(&input.descr)
        .fetch_one(&self.pool)
        .await?;
        resource_from_db(row)
    }

    async fn update_resource(&self, id: u32, input: &ResourceInput) -> StoreResult<Resource> {
        let row = sqlx::query_as::<_, DbResource>(&format!(
            "UPDATE resources SET url = $2, method = $3, label = $4, descr = $5, updated_at = now() WHERE id = $1 RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(i64::from(id))
        .bind(&input.url)
        .bind(&input.method)
        .bind(&input.label)
        .bind(&input.descr)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        resource_from_db(row)
    }

    async fn delete_resource(&self, id: u32) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(i64::from(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        Ok(())
    }

    async fn get_resource(&self, id: u32) -> StoreResult<Resource> {
        let row = sqlx::query_as::<_, DbResource>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1"
        ))
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        resource_from_db(row)
    }

    async fn list_resources(&self, query: &ListQuery) -> StoreResult<Page<Resource>> {
        let (rows, total, query) = self
            .fetch_page::<DbResource>("resources", RESOURCE_COLUMNS, query, RESOURCE_FILTERS)
            .await?;
        Ok(Page {
            items: rows
                .into_iter()
                .map(resource_from_db)
                .collect::<StoreResult<_>>()?,
            total,
            page: query.page,
            size: query.size,
        })
    }

    async fn find_resources(&self, ids: &[u32]) -> StoreResult<Vec<Resource>> {
        let rows = sqlx::query_as::<_, DbResource>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(to_db_ids(ids))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(resource_from_db).collect()
    }

    async fn resource_rules(&self) -> StoreResult<Vec<ResourceRule>> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, url, method FROM resources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, url, method)| {
                Ok(ResourceRule {
                    id: to_id(id)?,
                    url,
                    method,
                })
            })
            .collect()
    }

    // -----------------------------
    // Menus
    // -----------------------------

    async fn create_menu(&self, input: &MenuInput) -> StoreResult<Menu> {
        let mut tx = self.pool.begin().await?;
        check_menu_placement(&mut tx, None, input.parent_id).await?;
        let row = sqlx::query_as::<_, DbMenu>(&format!(
            "INSERT INTO menus (path, component, name, title, icon, sort, is_active, descr, parent_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {MENU_COLUMNS}"
        ))
        .bind(&input.path)
        .bind(&input.component)
        .bind(&input.name)
        .bind(&input.meta.title)
        .bind(&input.meta.icon)
        .bind(input.sort)
        .bind(input.is_active)
        .bind(&input.descr)
        .bind(input.parent_id.map(i64::from))
        .fetch_one(&mut *tx)
        .await?;
        let resource_ids = sync_links(
            &mut tx,
            &MENU_RESOURCES,
            row.id,
            Some(input.resource_ids.as_deref().unwrap_or_default()),
        )
        .await?;
        tx.commit().await?;
        menu_from_db(row, resource_ids)
    }

    async fn update_menu(&self, id: u32, input: &MenuInput) -> StoreResult<Menu> {
        let mut tx = self.pool.begin().await?;
        check_menu_placement(&mut tx, Some(id), input.parent_id).await?;
        let row = sqlx::query_as::<_, DbMenu>(&format!(
            "UPDATE menus SET path = $2, component = $3, name = $4, title = $5, icon = $6, sort = $7, \
             is_active = $8, descr = $9, parent_id = $10, updated_at = now() WHERE id = $1 RETURNING {MENU_COLUMNS}"
        ))
        .bind(i64::from(id))
        .bind(&input.path)
        .bind(&input.component)
        .bind(&input.name)
        .bind(&input.meta.title)
        .bind(&input.meta.icon)
        .bind(input.sort)
        .bind(input.is_active)
        .bind(&input.descr)
        .bind(input.parent_id.map(i64::from))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("menu {id}")))?;
        let resource_ids = sync_links(
            &mut tx,
            &MENU_RESOURCES,
            row.id,
            input.resource_ids.as_deref(),
        )
        .await?;
        tx.commit().await?;
        menu_from_db(row, resource_ids)
    }

    async fn delete_menu(&self, id: u32) -> StoreResult<MenuRemoval> {
        let mut tx = self.pool.begin().await?;
        // No child menu can be added or moved in until this transaction ends.
        lock_menu_tree(&mut tx).await?;
        // UNION (not UNION ALL) terminates even if stored parent links form a cycle.
        let menu_rows = sqlx::query_scalar::<_, i64>(
            "WITH RECURSIVE subtree(id) AS ( \
                 SELECT id FROM menus WHERE id = $1 \
                 UNION \
                 SELECT m.id FROM menus m JOIN subtree s ON m.parent_id = s.id \
             ) SELECT id FROM subtree ORDER BY id",
        )
        .bind(i64::from(id))
        .fetch_all(&mut *tx)
        .await?;
        if menu_rows.is_empty() {
            return Err(StoreError::NotFound(format!("menu {id}")));
        }
        // Row locks block button inserts and moves that reference the subtree.
        sqlx::query("SELECT id FROM menus WHERE id = ANY($1) FOR UPDATE")
            .bind(&menu_rows)
            .execute(&mut *tx)
            .await?;
        let mut button_rows = sqlx::query_scalar::<_, i64>(
            "DELETE FROM buttons WHERE menu_id = ANY($1) RETURNING id",
        )
        .bind(&menu_rows)
        .fetch_all(&mut *tx)
        .await?;
        button_rows.sort_unstable();
        let deleted = sqlx::query("DELETE FROM menus WHERE id = ANY($1)")
            .bind(&menu_rows)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() != menu_rows.len() as u64 {
            return Err(StoreError::Unexpected(anyhow!(
                "menu subtree of {id} changed during delete"
            )));
        }
        tx.commit().await?;
        Ok(MenuRemoval {
            menu_ids: menu_rows.into_iter().map(to_id).collect::<StoreResult<_>>()?,
            button_ids: button_rows
                .into_iter()
                .map(to_id)
                .collect::<StoreResult<_>>()?,
        })
    }

    async fn get_menu(&self, id: u32) -> StoreResult<Menu> {
        let row = sqlx::query_as::<_, DbMenu>(&format!(
            "SELECT {MENU_COLUMNS} FROM menus WHERE id = $1"
        ))
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("menu {id}")))?;
        let mut menus = self.menus_with_links(vec![row]).await?;
        menus
            .pop()
            .ok_or_else(|| StoreError::NotFound(format!("menu {id}")))
    }

    async fn list_menus(&self, query: &ListQuery) -> StoreResult<Page<Menu>> {
        let (rows, total, query) = self
            .fetch_page::<DbMenu>("menus", MENU_COLUMNS, query, MENU_FILTERS)
            .await?;
        Ok(Page {
            items: self.menus_with_links(rows).await?,
            total,
            page: query.page,
            size: query.size,
        })
    }

    async fn find_menus(&self, ids: &[u32]) -> StoreResult<Vec<Menu>> {
        let rows = sqlx::query_as::<_, DbMenu>(&format!(
            "SELECT {MENU_COLUMNS} FROM menus WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(to_db_ids(ids))
        .fetch_all(&self.pool)
        .await?;
        self.menus_with_links(rows).await
    }

    async fn menu_bindings(&self) -> StoreResult<Vec<MenuBinding>> {
        let rows = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT id, parent_id FROM menus ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut links = self.all_links(&MENU_RESOURCES).await?;
        rows.into_iter()
            .map(|(id, parent_id)| {
                Ok(MenuBinding {
                    id: to_id(id)?,
                    parent_id: parent_id.map(to_id).transpose()?,
                    resource_ids: links.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    // -----------------------------
    // Buttons
    // -----------------------------

    async fn create_button(&self, input: &ButtonInput) -> StoreResult<Button> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbButton>(&format!(
            "INSERT INTO buttons (name, sort, is_active, descr, menu_id) VALUES ($1, $2, $3, $4, $5) RETURNING {BUTTON_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(input.sort)
        .bind(input.is_active)
        .bind(&input.descr)
        .bind(i64::from(input.menu_id))
        .fetch_one(&mut *tx)
        .await?;
        let resource_ids = sync_links(
            &mut tx,
            &BUTTON_RESOURCES,
            row.id,
            Some(input.resource_ids.as_deref().unwrap_or_default()),
        )
        .await?;
        tx.commit().await?;
        button_from_db(row, resource_ids)
    }

    async fn update_button(&self, id: u32, input: &ButtonInput) -> StoreResult<Button> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbButton>(&format!(
            "UPDATE buttons SET name = $2, sort = $3, is_active = $4, descr = $5, menu_id = $6, updated_at = now() \
             WHERE id = $1 RETURNING {BUTTON_COLUMNS}"
        ))
        .bind(i64::from(id))
        .bind(&input.name)
        .bind(input.sort)
        .bind(input.is_active)
        .bind(&input.descr)
        .bind(i64::from(input.menu_id))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("button {id}")))?;
        let resource_ids = sync_links(
            &mut tx,
            &BUTTON_RESOURCES,
            row.id,
            input.resource_ids.as_deref(),
        )
        .await?;
        tx.commit().await?;
        button_from_db(row, resource_ids)
    }

    async fn delete_button(&self, id: u32) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM buttons WHERE id = $1")
            .bind(i64::from(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("button {id}")));
        }
        Ok(())
    }

    async fn get_button(&self, id: u32) -> StoreResult<Button> {
        let row = sqlx::query_as::<_, DbButton>(&format!(
            "SELECT {BUTTON_COLUMNS} FROM buttons WHERE id = $1"
        ))
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("button {id}")))?;
        let mut buttons = self.buttons_with_links(vec![row]).await?;
        buttons
            .pop()
            .ok_or_else(|| StoreError::NotFound(format!("button {id}")))
    }

    async fn list_buttons(&self, query: &ListQuery) -> StoreResult<Page<Button>> {
        let (rows, total, query) = self
            .fetch_page::<DbButton>("buttons", BUTTON_COLUMNS, query, BUTTON_FILTERS)
            .await?;
        Ok(Page {
            items: self.buttons_with_links(rows).await?,
            total,
            page: query.page,
            size: query.size,
        })
    }

    async fn find_buttons(&self, ids: &[u32]) -> StoreResult<Vec<Button>> {
        let rows = sqlx::query_as::<_, DbButton>(&format!(
            "SELECT {BUTTON_COLUMNS} FROM buttons WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(to_db_ids(ids))
        .fetch_all(&self.pool)
        .await?;
        self.buttons_with_links(rows).await
    }

    async fn button_bindings(&self) -> StoreResult<Vec<ButtonBinding>> {
        let rows = sqlx::query_as::<_, (i64, i64)>("SELECT id, menu_id FROM buttons ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut links = self.all_links(&BUTTON_RESOURCES).await?;
        rows.into_iter()
            .map(|(id, menu_id)| {
                Ok(ButtonBinding {
                    id: to_id(id)?,
                    menu_id: to_id(menu_id)?,
                    resource_ids: links.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    // -----------------------------
    // Roles
    // -----------------------------

    async fn create_role(&self, input: &RoleInput) -> StoreResult<Role> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbRole>(&format!(
            "INSERT INTO roles (name, descr) VALUES ($1, $2) RETURNING {ROLE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(&input.descr)
        .fetch_one(&mut *tx)
        .await?;
        let resource_ids = sync_links(
            &mut tx,
            &ROLE_RESOURCES,
            row.id,
            Some(input.resource_ids.as_deref().unwrap_or_default()),
        )
        .await?;
        let menu_ids = sync_links(
            &mut tx,
            &ROLE_MENUS,
            row.id,
            Some(input.menu_ids.as_deref().unwrap_or_default()),
        )
        .await?;
        let button_ids = sync_links(
            &mut tx,
            &ROLE_BUTTONS,
            row.id,
            Some(input.button_ids.as_deref().unwrap_or_default()),
        )
        .await?;
        tx.commit().await?;
        Ok(Role {
            id: to_id(row.id)?,
            name: row.name,
            descr: row.descr,
            resource_ids,
            menu_ids,
            button_ids,
        })
    }

    async fn update_role(&self, id: u32, input: &RoleInput) -> StoreResult<Role> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbRole>(&format!(
            "UPDATE roles SET name = $2, descr = $3, updated_at = now() WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        ))
        .bind(i64::from(id))
        .bind(&input.name)
        .bind(&input.descr)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("role {id}")))?;
        let resource_ids = sync_links(
            &mut tx,
            &ROLE_RESOURCES,
            row.id,
            input.resource_ids.as_deref(),
        )
        .await?;
        let menu_ids = sync_links(&mut tx, &ROLE_MENUS, row.id, input.menu_ids.as_deref()).await?;
        let button_ids =
            sync_links(&mut tx, &ROLE_BUTTONS, row.id, input.button_ids.as_deref()).await?;
        tx.commit().await?;
        Ok(Role {
            id: to_id(row.id)?,
            name: row.name,
            descr: row.descr,
            resource_ids,
            menu_ids,
            button_ids,
        })
    }

    async fn delete_role(&self, id: u32) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let in_use = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(i64::from(id))
            .fetch_one(&mut *tx)
            .await?
            > 0;
        if in_use {
            return Err(StoreError::Conflict(format!(
                "role {id} is assigned to users"
            )));
        }
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("role {id}")));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_role(&self, id: u32) -> StoreResult<Role> {
        let row = sqlx::query_as::<_, DbRole>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"
        ))
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("role {id}")))?;
        let mut roles = self.roles_with_links(vec![row]).await?;
        roles
            .pop()
            .ok_or_else(|| StoreError::NotFound(format!("role {id}")))
    }

    async fn list_roles(&self, query: &ListQuery) -> StoreResult<Page<Role>> {
        let (rows, total, query) = self
            .fetch_page::<DbRole>("roles", ROLE_COLUMNS, query, ROLE_FILTERS)
            .await?;
        Ok(Page {
            items: self.roles_with_links(rows).await?,
            total,
            page: query.page,
            size: query.size,
        })
    }

    async fn find_roles(&self, ids: &[u32]) -> StoreResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, DbRole>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(to_db_ids(ids))
        .fetch_all(&self.pool)
        .await?;
        self.roles_with_links(rows).await
    }

    async fn role_bindings(&self) -> StoreResult<Vec<RoleBinding>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut resources = self.all_links(&ROLE_RESOURCES).await?;
        let mut menus = self.all_links(&ROLE_MENUS).await?;
        let mut buttons = self.all_links(&ROLE_BUTTONS).await?;
        ids.into_iter()
            .map(|id| {
                Ok(RoleBinding {
                    id: to_id(id)?,
                    resource_ids: resources.remove(&id).unwrap_or_default(),
                    menu_ids: menus.remove(&id).unwrap_or_default(),
                    button_ids: buttons.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    // -----------------------------
    // Users
    // -----------------------------

    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "INSERT INTO users (username, password_hash, is_active, is_staff, role_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(i64::from(user.role_id))
        .fetch_one(&self.pool)
        .await?;
        Ok(user_from_db(row)?.user)
    }

    async fn update_user(&self, id: u32, patch: &UserPatch) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "UPDATE users SET password_hash = COALESCE($2, password_hash), \
             is_active = COALESCE($3, is_active), is_staff = COALESCE($4, is_staff), \
             role_id = COALESCE($5, role_id), updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(i64::from(id))
        .bind(patch.password_hash.as_deref())
        .bind(patch.is_active)
        .bind(patch.is_staff)
        .bind(patch.role_id.map(i64::from))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        Ok(user_from_db(row)?.user)
    }

    async fn delete_user(&self, id: u32) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(i64::from(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn get_user(&self, id: u32) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        Ok(user_from_db(row)?.user)
    }

    async fn list_users(&self, query: &ListQuery) -> StoreResult<Page<User>> {
        let (rows, total, query) = self
            .fetch_page::<DbUser>("users", USER_COLUMNS, query, USER_FILTERS)
            .await?;
        Ok(Page {
            items: rows
                .into_iter()
                .map(|row| user_from_db(row).map(|account| account.user))
                .collect::<StoreResult<_>>()?,
            total,
            page: query.page,
            size: query.size,
        })
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<UserAccount> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {username}")))?;
        user_from_db(row)
    }

    async fn record_login(&self, record: &NewLoginRecord) -> StoreResult<LoginRecord> {
        let row = sqlx::query_as::<_, DbLoginRecord>(&format!(
            "INSERT INTO login_records (username, ip_address, user_agent, success, outcome, login_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {LOGIN_RECORD_COLUMNS}"
        ))
        .bind(&record.username)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(record.success)
        .bind(&record.outcome)
        .bind(i64::try_from(record.login_at).unwrap_or(i64::MAX))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_login_records(&self, query: &ListQuery) -> StoreResult<Page<LoginRecord>> {
        let (rows, total, query) = self
            .fetch_page::<DbLoginRecord>(
                "login_records",
                LOGIN_RECORD_COLUMNS,
                query,
                LOGIN_RECORD_FILTERS,
            )
            .await?;
        Ok(Page {
            items: rows
                .into_iter()
                .map(LoginRecord::try_from)
                .collect::<StoreResult<_>>()?,
            total,
            page: query.page,
            size: query.size,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return StoreError::NotFound("row".to_string());
        }
        if is_unique_violation(&err) {
            return StoreError::Conflict(violated_constraint(&err, "unique constraint violated"));
        }
        if is_foreign_key_violation(&err) {
            return StoreError::NotFound(violated_constraint(&err, "referenced row missing"));
        }
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23503").unwrap_or(false);
    }
    false
}

fn violated_constraint(err: &sqlx::Error, fallback: &str) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .constraint()
            .map(|name| format!("{fallback}: {name}"))
            .unwrap_or_else(|| fallback.to_string()),
        _ => fallback.to_string(),
    }
}
