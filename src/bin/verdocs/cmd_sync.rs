use verdocs::{
    git::{Config, Repo},
    Result,
};

pub fn handle(cfg: Config) -> Result<()> {
    let repo = Repo::open(&cfg.loc_repo)?;
    crate::push(&repo, &cfg)
}
