//! The serialization contract. The wire format itself belongs to an
//! external collaborator; the core only defines the byte-stream the
//! per-type `save`/`restore` hooks talk to and the object-level
//! drivers that prefix each value with its (stable) type code.

use crate::err::{set_error, Res};
use crate::interp::Interp;
use crate::object::Obj;

/// A byte sink/source for object serialization.
pub trait Archiver {
    fn write(&mut self, data: &[u8]) -> Res;
    fn read(&mut self, buf: &mut [u8]) -> Res;

    fn write_i64(&mut self, v: i64) -> Res {
        self.write(&v.to_le_bytes())
    }

    fn read_i64(&mut self) -> Res<i64> {
        let mut b = [0u8; 8];
        self.read(&mut b)?;
        Ok(i64::from_le_bytes(b))
    }

    fn write_f64(&mut self, v: f64) -> Res {
        self.write(&v.to_bits().to_le_bytes())
    }

    fn read_f64(&mut self) -> Res<f64> {
        let mut b = [0u8; 8];
        self.read(&mut b)?;
        Ok(f64::from_bits(u64::from_le_bytes(b)))
    }
}

/// Save `o` prefixed with its type code.
pub fn save_obj(ip: &mut Interp, ar: &mut dyn Archiver, o: Obj) -> Res {
    ar.write(&[o.tcode()])?;
    let t = ip.type_of(o);
    t.save(ip, ar, o)
}

/// Restore one object: read the type code, dispatch to that type's
/// hook.
pub fn restore_obj(ip: &mut Interp, ar: &mut dyn Archiver) -> Res<Obj> {
    let mut tc = [0u8; 1];
    ar.read(&mut tc)?;
    if tc[0] as usize >= ip.num_types() {
        return set_error(format!("restore of unknown type code {}", tc[0]));
    }
    let t = ip.type_of_code(tc[0]);
    t.restore(ip, ar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err::set_error;
    use crate::testutil::with_interp;
    use serial_test::serial;

    /// In-memory byte stream for round-trip tests.
    struct VecArchiver {
        data: Vec<u8>,
        pos: usize,
    }

    impl VecArchiver {
        fn new() -> VecArchiver {
            VecArchiver {
                data: Vec::new(),
                pos: 0,
            }
        }
    }

    impl Archiver for VecArchiver {
        fn write(&mut self, data: &[u8]) -> Res {
            self.data.extend_from_slice(data);
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Res {
            if self.pos + buf.len() > self.data.len() {
                return set_error("archive truncated");
            }
            buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
            self.pos += buf.len();
            Ok(())
        }
    }

    #[test]
    #[serial]
    fn test_scalars_round_trip() {
        with_interp(|ip| {
            let i = crate::int::new_int(ip, -987654).unwrap();
            let f = crate::float::new_float(ip, 3.25).unwrap();
            let s = crate::string::new_str(ip, b"round trip").unwrap();
            for o in [i, f, s, ip.o_null] {
                let mut ar = VecArchiver::new();
                save_obj(ip, &mut ar, o).unwrap();
                let back = restore_obj(ip, &mut ar).unwrap();
                assert!(ip.obj_eq(o, back));
                back.decref();
            }
            i.decref();
            f.decref();
            s.decref();
        });
    }

    #[test]
    #[serial]
    fn test_aggregates_round_trip_to_equal_values() {
        with_interp(|ip| {
            // [1, "two", [3.0]] and {a = 1} and a set.
            let inner = crate::array::new_array(ip, 1).unwrap();
            let three = crate::float::new_float(ip, 3.0).unwrap();
            crate::array::push(ip, inner, three).unwrap();
            three.decref();

            let a = crate::array::new_array(ip, 3).unwrap();
            let one = crate::int::new_int(ip, 1).unwrap();
            crate::array::push(ip, a, one).unwrap();
            let two = crate::string::new_str(ip, b"two").unwrap();
            crate::array::push(ip, a, two).unwrap();
            crate::array::push(ip, a, inner).unwrap();
            inner.decref();

            let m = crate::map::new_map(ip).unwrap();
            let ka = crate::string::new_str(ip, b"a").unwrap();
            crate::map::assign_base(ip, m, ka, one).unwrap();
            ka.decref();

            let st = crate::set::new_set(ip).unwrap();
            crate::set::add(ip, st, one).unwrap();
            crate::set::add(ip, st, two).unwrap();
            one.decref();
            two.decref();

            for o in [a, m, st] {
                let mut ar = VecArchiver::new();
                save_obj(ip, &mut ar, o).unwrap();
                let back = restore_obj(ip, &mut ar).unwrap();
                assert!(ip.obj_eq(o, back), "round trip changed the value");
                assert_ne!(o, back);
                back.decref();
                o.decref();
            }
        });
    }

    #[test]
    #[serial]
    fn test_files_are_not_transmissible() {
        with_interp(|ip| {
            let name = crate::string::new_str(ip, b"<test>").unwrap();
            let f = crate::file::open_charbuf(ip, b"data", name).unwrap();
            name.decref();
            let mut ar = VecArchiver::new();
            assert!(save_obj(ip, &mut ar, f).is_err());
            crate::err::clear_error();
            let _ = crate::file::close_file(ip, f);
            f.decref();
        });
    }
}
