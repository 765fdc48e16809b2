pub use self::{
    client::Client,
    dmo_response::DmoResponse,
    executor::{Cancellable, Executor},
    executor_ext::ExecutorExt,
    tuple_response::TupleResponse,
    update_operation::{UpdateArgument, UpdateOperation, UpdateOperationKind},
};

pub mod schema;

mod client;
mod dmo_response;
mod executor;
mod executor_ext;
mod tuple_response;
mod update_operation;

mod private {
    use crate::{
        client::{Cancellable, Client},
        pool::PooledConnection,
        Connection,
    };

    #[doc(hidden)]
    pub trait Sealed {}

    impl Sealed for Connection {}
    impl Sealed for PooledConnection {}
    impl Sealed for Client {}
    impl<E> Sealed for Cancellable<E> {}
    impl<S: Sealed + ?Sized> Sealed for &S {}
}
