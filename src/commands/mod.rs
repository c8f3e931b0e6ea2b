pub type CmdResult<T> = mvgmvs::Result<(T, i32)>;

pub mod run;
