//! The connection to the chat server, and the tasks that drive it.
//!
//! A [`Connection`] owns one TCP stream split into halves. The inbound reader
//! task turns bytes into lines, enforcing an idle timeout; the outbound pacer
//! task drains a bounded queue of lines, spacing writes by a fixed throttle
//! interval. Either task failing ends the connection.
//!
//! A connection can also be [saved](Connection::save): both tasks stop, and the
//! still-open socket is returned along with any partially received input and
//! unsent output, so that another process can carry on with it.

pub mod error;
pub use error::*;

mod connection;
pub use connection::*;

mod internal
{
    pub mod reader;
    pub use reader::*;
    pub mod pacer;
    pub use pacer::*;
}

pub use internal::MAX_LINE_LEN;
