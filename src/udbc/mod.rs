pub mod value;

pub mod connection;
pub mod deserializer;
pub mod driver;
pub mod serializer;
pub mod state;

pub use connection::{
    Connection, ConnectionState, PreparedStatement, QueryResult, Row, RowEvents,
};
pub use driver::Driver;
pub use value::Value;
