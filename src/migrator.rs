use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_orders_table::Migration),
            Box::new(m20240301_000002_create_charges_table::Migration),
            Box::new(m20240301_000003_create_subscriptions_table::Migration),
            Box::new(m20240301_000004_create_cart_items_table::Migration),
        ]
    }
}

mod m20240301_000001_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::CustomerEmail).string().not_null())
                        .col(ColumnDef::new(Orders::Products).json().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::ShipFirstName).string().not_null())
                        .col(ColumnDef::new(Orders::ShipLastName).string().not_null())
                        .col(ColumnDef::new(Orders::ShipPhone).string().not_null())
                        .col(ColumnDef::new(Orders::ShipStreet).string().not_null())
                        .col(ColumnDef::new(Orders::ShipCity).string().not_null())
                        .col(ColumnDef::new(Orders::ShipState).string().not_null())
                        .col(ColumnDef::new(Orders::ShipPostalCode).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentMode).string_len(16).not_null())
                        .col(ColumnDef::new(Orders::PaymentId).string().null())
                        .col(
                            ColumnDef::new(Orders::PaymentStatus)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::OrderStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_status")
                        .table(Orders::Table)
                        .col(Orders::OrderStatus)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        OrderId,
        UserId,
        CustomerEmail,
        Products,
        TotalAmount,
        ShipFirstName,
        ShipLastName,
        ShipPhone,
        ShipStreet,
        ShipCity,
        ShipState,
        ShipPostalCode,
        PaymentMode,
        PaymentId,
        PaymentStatus,
        OrderStatus,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_charges_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_charges_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Charges::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Charges::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Charges::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Charges::ChargePercent)
                                .decimal_len(7, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Charges::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Charges::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Charges::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Charges {
        Table,
        Id,
        Name,
        ChargePercent,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_subscriptions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_subscriptions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Subscriptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Subscriptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subscriptions::UserId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Subscriptions::CustomerId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subscriptions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subscriptions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Subscriptions {
        Table,
        Id,
        UserId,
        CustomerId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_cart_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_cart_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).string().not_null())
                        .col(
                            ColumnDef::new(CartItems::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_user_id")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum CartItems {
        Table,
        Id,
        UserId,
        ProductId,
        Quantity,
        CreatedAt,
    }
}
