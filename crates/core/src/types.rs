//! Registration of the built-in types, in the fixed order that keeps
//! their codes stable.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{self, ObjType};

/// Placeholder occupying the reserved type code 0.
struct NoneType;

impl ObjType for NoneType {
    fn name(&self) -> &'static str {
        "none"
    }

    fn mark(&self, _ip: &Interp, o: crate::object::Obj) -> usize {
        o.set_flag(crate::object::O_MARK);
        0
    }

    unsafe fn free(&self, _ip: &mut Interp, _o: crate::object::Obj) {}
}

static NONE_TYPE: NoneType = NoneType;
static PC_TYPE: crate::pc::PcType = crate::pc::PcType;
static SRC_TYPE: crate::src::SrcType = crate::src::SrcType;
static PARSE_TYPE: crate::parse::ParseType = crate::parse::ParseType;
static OP_TYPE: crate::op::OpType = crate::op::OpType;
static STR_TYPE: crate::string::StrType = crate::string::StrType;
static CATCHER_TYPE: crate::catcher::CatcherType = crate::catcher::CatcherType;
static FUNC_TYPE: crate::func::FuncType = crate::func::FuncType;
static CFUNC_TYPE: crate::cfunc::CfuncType = crate::cfunc::CfuncType;
static METHOD_TYPE: crate::method::MethodType = crate::method::MethodType;
static MARK_TYPE: crate::markobj::MarkType = crate::markobj::MarkType;
static NULL_TYPE: crate::null::NullType = crate::null::NullType;
static INT_TYPE: crate::int::IntType = crate::int::IntType;
static FLOAT_TYPE: crate::float::FloatType = crate::float::FloatType;
static ARRAY_TYPE: crate::array::ArrayType = crate::array::ArrayType;
static MAP_TYPE: crate::map::MapType = crate::map::MapType;
static SET_TYPE: crate::set::SetType = crate::set::SetType;
static EXEC_TYPE: crate::exec::ExecType = crate::exec::ExecType;
static FILE_TYPE: crate::file::FileType = crate::file::FileType;
static MEM_TYPE: crate::mem::MemType = crate::mem::MemType;
static PTR_TYPE: crate::ptr::PtrType = crate::ptr::PtrType;
static REGEXP_TYPE: crate::regexp::RegexpType = crate::regexp::RegexpType;
static HANDLE_TYPE: crate::handle::HandleType = crate::handle::HandleType;
static CHANNEL_TYPE: crate::channel::ChannelType = crate::channel::ChannelType;

pub(crate) fn register_builtin_types(ip: &mut Interp) -> Res {
    let expected: [(&'static dyn ObjType, u8); 24] = [
        (&NONE_TYPE, object::TC_NONE),
        (&PC_TYPE, object::TC_PC),
        (&SRC_TYPE, object::TC_SRC),
        (&PARSE_TYPE, object::TC_PARSE),
        (&OP_TYPE, object::TC_OP),
        (&STR_TYPE, object::TC_STRING),
        (&CATCHER_TYPE, object::TC_CATCHER),
        (&FUNC_TYPE, object::TC_FUNC),
        (&CFUNC_TYPE, object::TC_CFUNC),
        (&METHOD_TYPE, object::TC_METHOD),
        (&MARK_TYPE, object::TC_MARK),
        (&NULL_TYPE, object::TC_NULL),
        (&INT_TYPE, object::TC_INT),
        (&FLOAT_TYPE, object::TC_FLOAT),
        (&ARRAY_TYPE, object::TC_ARRAY),
        (&MAP_TYPE, object::TC_MAP),
        (&SET_TYPE, object::TC_SET),
        (&EXEC_TYPE, object::TC_EXEC),
        (&FILE_TYPE, object::TC_FILE),
        (&MEM_TYPE, object::TC_MEM),
        (&PTR_TYPE, object::TC_PTR),
        (&REGEXP_TYPE, object::TC_REGEXP),
        (&HANDLE_TYPE, object::TC_HANDLE),
        (&CHANNEL_TYPE, object::TC_CHANNEL),
    ];
    for (t, code) in expected {
        let got = ip.register_type(t)?;
        debug_assert_eq!(got, code);
        let _ = got;
    }
    // Codes below TC_MAX_CORE stay reserved for future core types, so
    // dynamically registered types land beyond the stable range.
    while ip.num_types() < object::TC_MAX_CORE as usize {
        ip.register_type(&NONE_TYPE)?;
    }
    Ok(())
}
