//! Channels: bounded queues between interpreter threads, the intended
//! cross-thread communication mechanism.
//!
//! `put` blocks while the channel is full, `get` while it is empty;
//! both use the wait/wakeup rendezvous on the channel object, which
//! releases the GIL for the duration of the sleep. A `put`
//! happens-before the `get` that receives the value.

use crate::array::{arrayof, arrayof_mut, new_array, push};
use crate::err::{set_error, Res};
use crate::interp::{waitfor, wakeup, Interp};
use crate::object::{Obj, ObjType, Object, O_MARK, TC_CHANNEL};

#[repr(C)]
pub struct ChannelObj {
    pub header: Object,
    /// Queued values, front at index 0.
    q: Obj,
    pub capacity: usize,
}

#[inline(always)]
pub fn channelof<'a>(o: Obj) -> &'a ChannelObj {
    debug_assert_eq!(o.tcode(), TC_CHANNEL);
    unsafe { &*(o.ptr() as *const ChannelObj) }
}

/// A new channel of the given capacity (at least 1).
pub fn new_channel(ip: &mut Interp, capacity: usize) -> Res<Obj> {
    if capacity == 0 {
        return set_error("channel capacity must be at least 1");
    }
    let p: *mut ChannelObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_CHANNEL, 0, 1, 0);
    unsafe {
        (*p).q = ip.o_null;
        (*p).capacity = capacity;
    }
    ip.rego(o);
    let q = new_array(ip, capacity)?;
    unsafe { (*p).q = q };
    q.decref();
    Ok(o)
}

/// Number of values waiting in the channel.
pub fn channel_len(ch: Obj) -> usize {
    arrayof(channelof(ch).q).len()
}

/// Blocking receive. Returns an owned value. Takes the interpreter
/// as proof the lock is held; the wait drops and re-acquires it.
pub fn channel_get(_ip: &mut Interp, ch: Obj) -> Res<Obj> {
    loop {
        let q = channelof(ch).q;
        if !arrayof(q).is_empty() {
            let v = arrayof(q).get(0);
            v.incref();
            arrayof_mut(q).rpop();
            wakeup(ch);
            return Ok(v);
        }
        // Empty: sleep until a put signals this channel. The GIL is
        // released while we wait; every field is re-read afterwards.
        waitfor(ch);
    }
}

/// Blocking send.
pub fn channel_put(ip: &mut Interp, ch: Obj, v: Obj) -> Res {
    loop {
        let q = channelof(ch).q;
        if arrayof(q).len() < channelof(ch).capacity {
            push(ip, q, v)?;
            wakeup(ch);
            return Ok(());
        }
        // Full: wait for a get to drain a slot. The caller keeps `v`
        // rooted (it is on the caller's operand stack).
        waitfor(ch);
    }
}

pub struct ChannelType;

impl ObjType for ChannelType {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<ChannelObj>() + crate::gc::mark_obj(ip, channelof(o).q)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<ChannelObj>(o.cast());
    }

    fn len(&self, _ip: &Interp, o: Obj) -> Res<usize> {
        Ok(channel_len(o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::int::{intof, new_int};
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_put_get_within_capacity_does_not_block() {
        with_interp(|ip| {
            let ch = new_channel(ip, 2).unwrap();
            let a = new_int(ip, 11).unwrap();
            let b = new_int(ip, 22).unwrap();
            channel_put(ip, ch, a).unwrap();
            channel_put(ip, ch, b).unwrap();
            assert_eq!(channel_len(ch), 2);
            let x = channel_get(ip, ch).unwrap();
            let y = channel_get(ip, ch).unwrap();
            assert_eq!(intof(x).value, 11);
            assert_eq!(intof(y).value, 22);
            assert_eq!(channel_len(ch), 0);
            x.decref();
            y.decref();
            a.decref();
            b.decref();
            ch.decref();
        });
    }

    #[test]
    #[serial]
    fn test_zero_capacity_is_rejected() {
        with_interp(|ip| {
            assert!(new_channel(ip, 0).is_err());
            crate::err::clear_error();
        });
    }
}
