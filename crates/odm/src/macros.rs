/// Declares an entity struct and its [`FieldAccessor`](crate::FieldAccessor)
/// implementation from a field table.
///
/// Every entity gets the base fields `id`, `live`, `created` and `modified`
/// (stored as `_id`, `live`, `created`, `modified`). Declared fields are
/// `Option<T>` where `T:` [`FieldValue`](crate::FieldValue); the logical type
/// follows `=>`, optional flags (`primary`, `indexed`, `required`) follow in
/// brackets. The schema is built on first use and kept for the process
/// lifetime.
///
/// The [`Model`](crate::Model) impl (collection name, cache and timeline
/// hooks) is written by hand next to the macro call.
///
/// ```rust
/// use opsdesk_odm::{model, FieldAccessor, LogicalType, Model};
///
/// model! {
///     /// A team inside the company.
///     pub struct Team {
///         name: String => Text [indexed, required],
///         head_count: i64 => Integer,
///     }
/// }
///
/// impl Model for Team {
///     const COLLECTION: &'static str = "teams";
/// }
///
/// let schema = Team::schema();
/// assert_eq!(schema.entity(), "Team");
/// assert_eq!(schema.field("name").map(|f| f.kind), Some(LogicalType::Text));
/// assert!(schema.field("created").is_some());
/// ```
#[macro_export]
macro_rules! model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident : $ty:ty => $kind:ident $([ $($flag:ident),* $(,)? ])?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default)]
        $vis struct $name {
            pub id: ::std::option::Option<$crate::ObjectId>,
            pub live: ::std::option::Option<bool>,
            pub created: ::std::option::Option<$crate::__private::UtcDateTime>,
            pub modified: ::std::option::Option<$crate::__private::UtcDateTime>,
            $(
                $(#[$field_meta])*
                pub $field: ::std::option::Option<$ty>,
            )*
            state: $crate::EntityState,
        }

        impl $crate::FieldAccessor for $name {
            fn schema() -> &'static $crate::Schema {
                static SCHEMA: ::std::sync::OnceLock<$crate::Schema> = ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    #[allow(unused_mut)]
                    let mut fields = $crate::Schema::base_fields();
                    $(
                        fields.push(
                            $crate::FieldDescriptor::new(
                                stringify!($field),
                                $crate::LogicalType::$kind,
                            )
                            $($( .$flag() )*)?
                        );
                    )*
                    $crate::Schema::new(stringify!($name), fields)
                })
            }

            fn read(&self, field: &str) -> ::std::option::Option<$crate::Value> {
                use $crate::FieldValue as _;
                match field {
                    $crate::ID_FIELD | $crate::ID_ALIAS => self.id.map(|v| v.into_value()),
                    $crate::LIVE_FIELD => self.live.map(|v| v.into_value()),
                    $crate::CREATED_FIELD => self.created.map(|v| v.into_value()),
                    $crate::MODIFIED_FIELD => self.modified.map(|v| v.into_value()),
                    $( stringify!($field) => self.$field.clone().map(|v| v.into_value()), )*
                    _ => ::std::option::Option::None,
                }
            }

            fn write(
                &mut self,
                field: &str,
                value: $crate::Value,
            ) -> ::std::result::Result<(), $crate::OdmError> {
                use $crate::OdmErrorExt as _;
                match field {
                    $crate::ID_FIELD | $crate::ID_ALIAS => {
                        self.id = <$crate::ObjectId as $crate::FieldValue>::from_value(value)
                            .context($crate::ID_FIELD)?;
                    },
                    $crate::LIVE_FIELD => {
                        self.live = <bool as $crate::FieldValue>::from_value(value)
                            .context($crate::LIVE_FIELD)?;
                    },
                    $crate::CREATED_FIELD => {
                        self.created =
                            <$crate::__private::UtcDateTime as $crate::FieldValue>::from_value(value)
                                .context($crate::CREATED_FIELD)?;
                    },
                    $crate::MODIFIED_FIELD => {
                        self.modified =
                            <$crate::__private::UtcDateTime as $crate::FieldValue>::from_value(value)
                                .context($crate::MODIFIED_FIELD)?;
                    },
                    $(
                        stringify!($field) => {
                            self.$field = <$ty as $crate::FieldValue>::from_value(value)
                                .context(stringify!($field))?;
                        },
                    )*
                    other => {
                        return ::std::result::Result::Err($crate::OdmError::Schema {
                            message: ::std::format!("unknown field '{other}'").into(),
                            context: ::std::option::Option::Some(stringify!($name).into()),
                        });
                    },
                }
                ::std::result::Result::Ok(())
            }

            fn state(&self) -> &$crate::EntityState {
                &self.state
            }

            fn state_mut(&mut self) -> &mut $crate::EntityState {
                &mut self.state
            }
        }
    };
}
