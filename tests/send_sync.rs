//! Send/Sync guarantees for types shared between log producers, the deferred
//! echo task and the socket driver.

use rstest::rstest;
use socket_log::{
    BoundedByteChannel, BudgetAllocator, ConsoleState, DeferredMessage, EchoWriter, LinkFlags,
    LogLine, SinkSlot, SocketDriver, SocketLog,
};
use static_assertions::assert_impl_all;

#[rstest]
fn shared_state_is_send_sync() {
    assert_impl_all!(SocketLog: Send, Sync);
    assert_impl_all!(SinkSlot: Send, Sync);
    assert_impl_all!(BoundedByteChannel: Send, Sync);
    assert_impl_all!(LinkFlags: Send, Sync);
    assert_impl_all!(ConsoleState: Send, Sync);
    assert_impl_all!(EchoWriter: Send, Sync);
    assert_impl_all!(BudgetAllocator: Send, Sync);
}

#[rstest]
fn owned_lines_cross_threads() {
    assert_impl_all!(LogLine: Send);
    assert_impl_all!(DeferredMessage: Send);
    assert_impl_all!(SocketDriver: Send, Sync);
}
