use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{DatabaseBackend, Statement};

use catchem_dim_core::ValidTime;

use crate::db::{DimUser, DwhSchemaVersion};
use crate::sql::build_stmt;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(DwhSchemaVersion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DwhSchemaVersion::Version)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DwhSchemaVersion::AppliedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DwhSchemaVersion::Checksum).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DimUser::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DimUser::UserSk)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(id_col(backend, DimUser::UserId))
                    .col(ColumnDef::new(DimUser::FirstName).string_len(255).not_null())
                    .col(ColumnDef::new(DimUser::LastName).string_len(255).not_null())
                    .col(ColumnDef::new(DimUser::Address).text().not_null())
                    .col(
                        ColumnDef::new(DimUser::ExperienceLevel)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DimUser::IsDedicator).boolean().not_null())
                    .col(ColumnDef::new(DimUser::ScdStart).big_integer().not_null())
                    .col(ColumnDef::new(DimUser::ScdEnd).big_integer().not_null())
                    .col(ColumnDef::new(DimUser::ScdVersion).integer().not_null())
                    .col(ColumnDef::new(DimUser::ScdActive).boolean().not_null())
                    .to_owned(),
            )
            .await?;

        create_indexes(manager).await?;

        let checksum = blake3::hash(self.name().as_bytes()).to_hex().to_string();
        let insert = Query::insert()
            .into_table(DwhSchemaVersion::Table)
            .columns([
                DwhSchemaVersion::Version,
                DwhSchemaVersion::AppliedAt,
                DwhSchemaVersion::Checksum,
            ])
            .values_panic([
                self.name().to_string().into(),
                ValidTime::now_micros().as_i64().into(),
                checksum.into(),
            ])
            .to_owned();
        let (sql, values) = build_stmt(backend, &insert);
        manager
            .get_connection()
            .execute_raw(Statement::from_sql_and_values(backend, sql, values))
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DimUser::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(DwhSchemaVersion::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

async fn create_indexes(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_index(
            Index::create()
                .name("dim_user_active_lookup_idx")
                .table(DimUser::Table)
                .col(DimUser::UserId)
                .col(DimUser::ScdActive)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("dim_user_version_uq")
                .table(DimUser::Table)
                .col(DimUser::UserId)
                .col(DimUser::ScdVersion)
                .unique()
                .to_owned(),
        )
        .await?;

    // MySQL has no partial indexes; the version index and the guarded close
    // keep it to one active row there.
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite | DatabaseBackend::Postgres => {
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS dim_user_one_active_uq \
                     ON dim_user (user_id) WHERE scd_active",
                )
                .await?;
        }
        _ => {}
    }
    Ok(())
}

fn id_col(backend: DatabaseBackend, col: impl Iden) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Postgres => {
            col_def.uuid();
        }
        DatabaseBackend::MySql => {
            col_def.binary_len(16);
        }
        _ => {
            col_def.string_len(36);
        }
    }
    col_def.not_null();
    col_def.to_owned()
}
