//! End-to-end compilation of complete programs

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use js2esi::frontend::module::MemoryLoader;
use js2esi::{CompileOptions, Compiler, ErrorKind, Unit};
use pretty_assertions::assert_eq;

const STR2INT: &str = "function str2int(s) {\n  \"inline\";\n  return int(s);\n}\n";

fn compile_with(options: CompileOptions, loader: MemoryLoader, source: &str) -> Unit {
    Compiler::with_loader(options, Arc::new(loader)).compile_source("main.js", source)
}

fn compile(source: &str) -> Unit {
    compile_with(CompileOptions::default(), MemoryLoader::new(), source)
}

fn esi(source: &str) -> String {
    let unit = compile(source);
    match unit.result {
        Ok(markup) => markup,
        Err(e) => panic!("{}", e.render(&unit.sources)),
    }
}

fn error_kind(unit: &Unit) -> ErrorKind {
    unit.result.as_ref().unwrap_err().kind()
}

#[test]
fn test_conditionals() {
    let out = esi(r#"
        let var1 = 'init';
        let v = 16;

        if (len(v) == 16) {
            var1 = 'sixteen';
        }
        else if (len(v) < 16) {
            var1 = 'lessthan-16';
        }
        else {
            var1 = 'big';
        }
    "#);
    assert_eq!(
        out,
        "<esi:assign name=\"var1\" value=\"'init'\"/>\
         <esi:assign name=\"v\" value=\"16\"/>\
         <esi:choose>\
         <esi:when test=\"$len($(v))==16\"><esi:assign name=\"var1\" value=\"'sixteen'\"/></esi:when>\
         <esi:when test=\"$len($(v))<16\"><esi:assign name=\"var1\" value=\"'lessthan-16'\"/></esi:when>\
         <esi:otherwise><esi:assign name=\"var1\" value=\"'big'\"/></esi:otherwise>\
         </esi:choose>"
    );
}

#[test]
fn test_negation_scope_changes_markup() {
    let narrow = esi("if (!v matches '17')\n    var1 = 'a';");
    let wide = esi("if (!( v matches '17') )\n    var1 = 'a';");
    assert_ne!(narrow, wide);
    assert!(narrow.contains("test=\"(!$(v)) matches '17'\""));
    assert!(wide.contains("test=\"!($(v) matches '17')\""));
}

#[test]
fn test_capture_bindings() {
    let out = esi(r#"
        if (v matches_i 'thi.*[str]*ing' as mset) {
            var1 = mset[2];
        }

        if (v == 20) {
        }
        else if (v matches 'some.*other.*string' as mset2){
            var1 = mset2[0];
        }

        if (v == 'True')
        // this comment should just be ignored...
            var1 = 'do_something';
    "#);
    assert!(out.contains(
        "<esi:when test=\"$(v) matches_i 'thi.*[str]*ing'\" matchname=\"mset\">\
         <esi:assign name=\"var1\" value=\"$(mset{2})\"/></esi:when>"
    ));
    assert!(out.contains(
        "<esi:when test=\"$(v)==20\"></esi:when>\
         <esi:when test=\"$(v) matches 'some.*other.*string'\" matchname=\"mset2\">"
    ));
    assert!(out.contains("<esi:when test=\"$(v)=='True'\">"));
}

#[test]
fn test_capture_misuse() {
    let unit = compile("if (v matches '(a)' as m) { x = 1; }\nprint(m[1]);");
    assert_eq!(error_kind(&unit), ErrorKind::ParseError);
    assert!(unit.render_error().unwrap().starts_with("main.js:2:7:"));

    let unit = compile("if (v matches '(a)' as m) { print(m['k']); }");
    assert_eq!(error_kind(&unit), ErrorKind::ParseError);

    let unit = compile("if (v matches '(a)' as m) { print(m[x]); }");
    assert_eq!(error_kind(&unit), ErrorKind::ParseError);
}

#[test]
fn test_compound_match_conditions() {
    let out = esi("if ((v has 'foo') ||(v has_i 'bar') )\n    var1 = 'parenScopingOk!';");
    assert_eq!(
        out,
        "<esi:choose><esi:when test=\"($(v) has 'foo')||($(v) has_i 'bar')\">\
         <esi:assign name=\"var1\" value=\"'parenScopingOk!'\"/></esi:when></esi:choose>"
    );
}

#[test]
fn test_bitwise_and_arithmetic_expressions() {
    let out = esi(r#"
        v = (1 << 2) | (1 << 4);
        if ( v & ( 1 << 3 ) )
          s = 'third bit set';
        result = ( '*' * ( ( 25 % 13 ) / ( 3 - 1 ) )  ) + ' six stars!';
        value = ( ( 1 << 5 ) | ( 1 << 3 ) ) >> 1;
        value = value ^ ( ~ 10 );
        if ( a == 12 && ( b != 'options' || c <= 4 ) && d < 5 && e > 15 )
          boolval = e >= 9;
    "#);
    assert!(out.starts_with("<esi:assign name=\"v\" value=\"20\"/>"));
    assert!(out.contains("<esi:when test=\"$(v)&8\">"));
    assert!(out.contains("<esi:assign name=\"result\" value=\"'****** six stars!'\"/>"));
    assert!(out.contains("<esi:assign name=\"value\" value=\"20\"/>"));
    assert!(out.contains("<esi:assign name=\"value\" value=\"$(value)^(-11)\"/>"));
    assert!(out.contains(
        "test=\"((($(a)==12)&&(($(b)!='options')||($(c)<=4)))&&($(d)<5))&&($(e)>15)\""
    ));
    assert!(out.contains("<esi:assign name=\"boolval\" value=\"$(e)>=9\"/>"));
}

#[test]
fn test_inline_functions_fold_end_to_end() {
    let out = esi(r#"
        function multiply(a, b)
        {
          "inline";
          return a * b;
        }

        function times(a, b)
        {
            return multiply(a, b);
        }

        function double(a)
        {
          "inline";
          return multiply(a, 2);
        }

        sixteen = multiply(4, double(2));
        four = double(2);

        if ( multiply(3, sixteen) == double(24) )
          match = 'true';
    "#);
    assert_eq!(
        out,
        "<esi:assign name=\"sixteen\" value=\"16\"/>\
         <esi:assign name=\"four\" value=\"4\"/>\
         <esi:choose><esi:when test=\"(3*$(sixteen))==48\">\
         <esi:assign name=\"match\" value=\"'true'\"/></esi:when></esi:choose>"
    );
}

#[test]
fn test_inline_errors() {
    let unit = compile("function f(a) { \"inline\"; b = a; return b; }\nx = f(1);");
    assert_eq!(error_kind(&unit), ErrorKind::InlineError);

    let unit = compile(
        "function f(a) { \"inline\"; return g(a); }\n\
         function g(a) { \"inline\"; return f(a); }\n\
         x = f(1);",
    );
    assert_eq!(error_kind(&unit), ErrorKind::InlineError);
    assert!(unit.render_error().unwrap().contains("recursive"));
}

#[test]
fn test_non_inline_functions() {
    let source = r#"
        function convert(var0) {
          return convert(15) + convert(var0);
        }

        function someFunc()
        // effects: testing comments
        //          before the block-open
        {
          return false;
        }

        function del( arg1, arg2 = 0 ) {
          return arg1 - arg2;
        }
    "#;
    // declarations alone produce no markup
    assert_eq!(esi(source), "");

    let unit = compile(&format!("{}\nlet result = convert('good');", source));
    assert_eq!(error_kind(&unit), ErrorKind::UnsupportedConstruct);
    assert!(unit.render_error().unwrap().starts_with("main.js:"));
}

#[test]
fn test_imports() {
    let loader = MemoryLoader::new().with("moddir/str2int.js", STR2INT);
    let unit = compile_with(
        CompileOptions::default(),
        loader,
        r#"
        require( './moddir/str2int.js' );

        //### import a second time (no force)
        require( './moddir/str2int.js' );

        //### import a third time, this time forced
        require( './moddir/str2int.js', force=true );

        str = '919';
        num = str2int( str );

        printv( num );
        "#,
    );
    assert_eq!(
        unit.result.as_deref().unwrap(),
        "<esi:comment text=\"import a second time (no force)\"/>\
         <esi:comment text=\"import a third time, this time forced\"/>\
         <esi:assign name=\"str\" value=\"'919'\"/>\
         <esi:assign name=\"num\" value=\"$int($(str))\"/>\
         <esi:vars>$(num)</esi:vars>"
    );
    assert_eq!(unit.stats.imports.expanded, 2);
    assert_eq!(unit.stats.imports.skipped, 1);
}

#[test]
fn test_repeated_import_is_idempotent() {
    let lib = "function k() { \"inline\"; return 1; }\nprint('lib;');";
    let once = compile_with(
        CompileOptions::default(),
        MemoryLoader::new().with("a.js", lib),
        "require('a.js'); print(k());",
    );
    let twice = compile_with(
        CompileOptions::default(),
        MemoryLoader::new().with("a.js", lib),
        "require('a.js'); require('a.js'); print(k());",
    );
    assert_eq!(once.result, twice.result);
    assert_eq!(once.result.as_deref(), Ok("lib;1"));
}

#[test]
fn test_forced_import_redefines() {
    let lib = "function k() { \"inline\"; return 1; }";
    let source = "require('a.js');\n\
                  function k() { \"inline\"; return 2; }\n";

    let unit = compile_with(
        CompileOptions::default(),
        MemoryLoader::new().with("a.js", lib),
        &format!("{}require('a.js');\nprint(k());", source),
    );
    assert_eq!(unit.result.as_deref(), Ok("2"));

    let unit = compile_with(
        CompileOptions::default(),
        MemoryLoader::new().with("a.js", lib),
        &format!("{}require('a.js', force=true);\nprint(k());", source),
    );
    assert_eq!(unit.result.as_deref(), Ok("1"));
}

#[test]
fn test_unresolved_import() {
    let unit = compile("require('./nowhere.js');");
    assert_eq!(error_kind(&unit), ErrorKind::UnresolvedImportError);
    assert_eq!(unit.report().diagnostics[0].code, "E0003");
}

#[test]
fn test_include_and_eval() {
    let out = esi(r#"
        incpath1 = REQUEST_PATH;
        incpath2 = 'http://example.com/path/to/component.html';
        evalpath = 'http://example.com/path/to/file.esi';

        eval(src=evalpath + '?someparam=foo', dca='akamaizer->esi');

        try
        {
          include(src       = 'http://redirect.com/' + incpath1,
                  onError   = 'continue',
                  ttl       = '4h',
                  noStore   = 'on',
                  setHeader = 'Cookie: x=y',
                  method    = 'GET',
                  dca       = 'none',
                  );

          include(src       = 'http://redirect.com/' + incpath1,
                  setHeader = ['Cookie: x=y', 'Cookie: a=b'],
                  );
        }
        catch(e)
        {
          include(src=incpath2, maxWait=100);
        }
    "#);
    assert_eq!(
        out,
        "<esi:assign name=\"incpath1\" value=\"$(REQUEST_PATH)\"/>\
         <esi:assign name=\"incpath2\" value=\"'http://example.com/path/to/component.html'\"/>\
         <esi:assign name=\"evalpath\" value=\"'http://example.com/path/to/file.esi'\"/>\
         <esi:eval src=\"$(evalpath)?someparam=foo\" dca=\"'akamaizer->esi'\"/>\
         <esi:try><esi:attempt>\
         <esi:include src=\"http://redirect.com/$(incpath1)\" dca=\"none\" onerror=\"continue\" \
         ttl=\"4h\" no-store=\"on\" method=\"GET\" setheader=\"Cookie: x=y\"/>\
         <esi:include src=\"http://redirect.com/$(incpath1)\" \
         setheader=\"Cookie: x=y\" setheader=\"Cookie: a=b\"/>\
         </esi:attempt><esi:except>\
         <esi:include src=\"$(incpath2)\" maxwait=\"100\"/>\
         </esi:except></esi:try>"
    );
}

#[test]
fn test_unknown_include_option() {
    let unit = compile("include(src='/a', onerror='continue');");
    assert_eq!(error_kind(&unit), ErrorKind::UnsupportedConstruct);
    assert!(unit.render_error().unwrap().contains("did you mean `onError`"));
}

#[test]
fn test_loops() {
    let out = esi(r#"
        days = [1 .. 31];

        for (const day of days) {
          bananas = day * 3;
          print('With three bananas per day, on day ', day, ', we have ', bananas, ' bananas.\n');
        }

        for (item of days) {
          print('Day ' + item + ' - nothing to report.\n');
        }

        for (item of ([1..365])) {
          if ( item == 31 )
            break;
          print('Day ' + item + ' - really, nothing to report.\n');
        }
    "#);
    assert_eq!(out.matches(" bananas.\n").count(), 31);
    assert!(out.contains("<esi:assign name=\"bananas\" value=\"93\"/>"));
    assert!(out.contains("on day 31, we have $(bananas) bananas.\n"));
    assert_eq!(out.matches(" - nothing to report.\n").count(), 31);
    assert_eq!(out.matches(" - really, nothing to report.\n").count(), 30);
    assert!(out.contains("Day 30 - really"));
    assert!(!out.contains("Day 31 - really"));
    assert!(!out.contains("esi:foreach"));
}

#[test]
fn test_loop_errors() {
    let unit = compile("for (x of HTTP_HEADERS) { print(x); }");
    assert_eq!(error_kind(&unit), ErrorKind::UnboundedLoopError);

    let unit = compile("for (x of [1..3]) { if (y == x) break; print(x); }");
    assert_eq!(error_kind(&unit), ErrorKind::UnsupportedConstruct);

    let options = CompileOptions { max_loop_iterations: 10, ..Default::default() };
    let unit = compile_with(options.clone(), MemoryLoader::new(), "for (x of [1..11]) { print(x); }");
    assert_eq!(error_kind(&unit), ErrorKind::CompileLimitExceeded);

    // each loop stays under the limit, their product does not
    let unit = compile_with(
        options,
        MemoryLoader::new(),
        "for (x of [1..10]) { for (y of [1..10]) { for (z of [1..10]) { print(z); } } }",
    );
    assert_eq!(error_kind(&unit), ErrorKind::CompileLimitExceeded);
}

#[test]
fn test_try_except() {
    let out = esi(r#"
        path = REQUEST_PATH;

        try
        {
          if ( path === '/path/to/some/resource' ) {
            try {
              inInnerTry = 'true';
            }
            catch(e) {
              try
              {
                execute_and_fail_silently();
                inSilentTry = 'true';
              }
              inInnerExcept = 'true';
            }
          }
          inOuterTry = 'true';
        }
        catch(e) {
          inOuterExcept = 'true';
        }
    "#);
    assert_eq!(
        out,
        "<esi:assign name=\"path\" value=\"$(REQUEST_PATH)\"/>\
         <esi:try><esi:attempt>\
         <esi:choose><esi:when test=\"$(path)=='/path/to/some/resource'\">\
         <esi:try><esi:attempt><esi:assign name=\"inInnerTry\" value=\"'true'\"/></esi:attempt>\
         <esi:except>\
         <esi:try><esi:attempt><esi:vars>$execute_and_fail_silently()</esi:vars>\
         <esi:assign name=\"inSilentTry\" value=\"'true'\"/></esi:attempt><esi:except></esi:except></esi:try>\
         <esi:assign name=\"inInnerExcept\" value=\"'true'\"/>\
         </esi:except></esi:try>\
         </esi:when></esi:choose>\
         <esi:assign name=\"inOuterTry\" value=\"'true'\"/>\
         </esi:attempt><esi:except><esi:assign name=\"inOuterExcept\" value=\"'true'\"/></esi:except></esi:try>"
    );
    assert_eq!(
        esi("try { } catch(e) { }"),
        "<esi:try><esi:attempt></esi:attempt><esi:except></esi:except></esi:try>"
    );
}

#[test]
fn test_try_inside_uncalled_function() {
    let out = esi(r#"
        var path = REQUEST_PATH;

        function someFunction() {
          try {
            if ( path === '/path/to/some/resource' ) {
              return 'a';
            }
            return 'c';
          }
          catch(e) {
            return 'd';
          }
        }
    "#);
    assert_eq!(out, "<esi:assign name=\"path\" value=\"$(REQUEST_PATH)\"/>");
}

#[test]
fn test_opt_levels() {
    let inline_source = "function one() { \"inline\"; return 1; }\nx = one() + 1;";
    let options = CompileOptions { opt_level: 4, ..Default::default() };
    let unit = compile_with(options, MemoryLoader::new(), inline_source);
    assert_eq!(error_kind(&unit), ErrorKind::UnsupportedConstruct);

    let options = CompileOptions { opt_level: 0, ..Default::default() };
    let unit = compile_with(options, MemoryLoader::new(), "x = 1 + 2;");
    assert_eq!(unit.result.as_deref(), Ok("<esi:assign name=\"x\" value=\"1+2\"/>"));

    assert_eq!(esi(inline_source), "<esi:assign name=\"x\" value=\"2\"/>");
}

#[test]
fn test_batch_compiles_units_independently() {
    let dir = std::env::temp_dir().join(format!("js2esi-batch-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("lib.js"), "function twice(x) { \"inline\"; return x * 2; }").unwrap();
    fs::write(dir.join("good.js"), "require('./lib.js');\nprint(twice(4));").unwrap();
    fs::write(dir.join("bad.js"), "for (x of y) { print(x); }").unwrap();

    let paths: Vec<PathBuf> = ["good.js", "bad.js", "good.js"].iter().map(|f| dir.join(f)).collect();
    let units = Compiler::new(CompileOptions::default()).compile_batch(&paths);

    assert_eq!(units.len(), 3);
    assert_eq!(units[0].result.as_deref(), Ok("8"));
    assert_eq!(error_kind(&units[1]), ErrorKind::UnboundedLoopError);
    assert_eq!(units[2].result.as_deref(), Ok("8"));
    assert_eq!(units[2].stats.imports.expanded, 1);

    fs::remove_dir_all(&dir).ok();
}
