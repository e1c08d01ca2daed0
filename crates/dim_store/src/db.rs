use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum DwhSchemaVersion {
    Table,
    Version,
    AppliedAt,
    Checksum,
}

#[derive(Iden, Clone, Copy)]
pub enum DimUser {
    Table,
    UserSk,
    UserId,
    FirstName,
    LastName,
    Address,
    ExperienceLevel,
    IsDedicator,
    ScdStart,
    ScdEnd,
    ScdVersion,
    ScdActive,
}

pub const DIM_USER_COLUMNS: [DimUser; 11] = [
    DimUser::UserSk,
    DimUser::UserId,
    DimUser::FirstName,
    DimUser::LastName,
    DimUser::Address,
    DimUser::ExperienceLevel,
    DimUser::IsDedicator,
    DimUser::ScdStart,
    DimUser::ScdEnd,
    DimUser::ScdVersion,
    DimUser::ScdActive,
];

// Operational store tables read by the snapshot feed.

#[derive(Iden, Clone, Copy)]
#[iden = "user_table"]
pub enum SrcUser {
    Table,
    Id,
    FirstName,
    LastName,
    Number,
    Street,
    CityCityId,
}

#[derive(Iden, Clone, Copy)]
#[iden = "city"]
pub enum SrcCity {
    Table,
    CityId,
    CityName,
    CountryCode,
}

#[derive(Iden, Clone, Copy)]
#[iden = "country"]
pub enum SrcCountry {
    Table,
    Code,
    Name,
}

#[derive(Iden, Clone, Copy)]
#[iden = "treasure_log"]
pub enum SrcTreasureLog {
    Table,
    Id,
    HunterId,
    LogType,
    LogTime,
}

#[derive(Iden, Clone, Copy)]
#[iden = "treasure"]
pub enum SrcTreasure {
    Table,
    Id,
    OwnerId,
}
